//! Foreign array -> host array
//!
//! One-dimensional arrays are read in a single pass over the locked element
//! storage. Arrays with more dimensions are walked element by element with
//! full index tuples and come out as nested host arrays, outermost dimension
//! first. Only one array is ever locked at a time: variant elements are
//! copied out under the lock and converted after it is released.

use super::host::{HostContext, HostValue};
use super::Marshal;
use crate::errors::{BridgeError, Result};
use crate::variant::array::{
    ArrayError, FADF_BSTR, FADF_DISPATCH, FADF_HAVEVARTYPE, FADF_UNKNOWN, FADF_VARIANT,
};
use crate::variant::{ArrayData, SafeArray, VarType, Variant};
use smallvec::SmallVec;
use tracing::trace;

/// Element tag as the descriptor reports it.
fn element_type(array: &SafeArray) -> Result<VarType> {
    let vt = if array.has_feature(FADF_BSTR) {
        VarType::BStr
    } else if array.has_feature(FADF_UNKNOWN) {
        VarType::Unknown
    } else if array.has_feature(FADF_DISPATCH) {
        VarType::Dispatch
    } else if array.has_feature(FADF_VARIANT) {
        VarType::Variant
    } else if array.has_feature(FADF_HAVEVARTYPE) {
        array.get_vartype()?
    } else {
        return Err(BridgeError::undefined(
            "Unable to get type of array (no useful flags set)",
        ));
    };
    if vt == VarType::Empty {
        return Err(BridgeError::undefined("array element type is VT_EMPTY"));
    }
    if vt != array.element_type() {
        return Err(BridgeError::undefined(format!(
            "array descriptor says {} but elements are {}",
            vt.name(),
            array.element_type().name()
        )));
    }
    Ok(vt)
}

/// Elements read under the lock.
enum Snapshot {
    Converted(Vec<HostValue>),
    Variants(Vec<Variant>),
}

impl<C: HostContext + ?Sized> Marshal<'_, C> {
    pub(super) fn array_to_host(&self, array: &SafeArray, depth: usize) -> Result<HostValue> {
        let vt = element_type(array)?;
        trace!(target: "array", event = "to_host", vt = vt.name(), dims = array.dims(), len = array.len());
        match array.dims() {
            0 => Ok(HostValue::Array(Vec::new())),
            1 => self.vector_to_host(array, depth),
            _ => {
                let mut indices = SmallVec::<[i32; 4]>::new();
                self.walk_dimension(array, &mut indices, depth)
            }
        }
    }

    fn vector_to_host(&self, array: &SafeArray, depth: usize) -> Result<HostValue> {
        let snapshot = {
            let data = array.access_data()?;
            match &*data {
                ArrayData::Variant(items) => Snapshot::Variants(items.clone()),
                other => Snapshot::Converted(
                    (0..other.len())
                        .map(|i| self.element_to_host(other, i))
                        .collect::<Result<Vec<_>>>()?,
                ),
            }
        };
        match snapshot {
            Snapshot::Converted(items) => Ok(HostValue::Array(items)),
            Snapshot::Variants(items) => items
                .iter()
                .map(|item| self.to_host(item, depth))
                .collect::<Result<Vec<_>>>()
                .map(HostValue::Array),
        }
    }

    /// Convert one scalar element in place.
    fn element_to_host(&self, data: &ArrayData, index: usize) -> Result<HostValue> {
        let missing = || BridgeError::undefined(format!("array element {} missing", index));
        let value = match data {
            ArrayData::Bool(v) => HostValue::Bool(*v.get(index).ok_or_else(missing)?),
            ArrayData::I1(v) => HostValue::Int32(i32::from(*v.get(index).ok_or_else(missing)?)),
            ArrayData::UI1(v) => HostValue::Int32(i32::from(*v.get(index).ok_or_else(missing)?)),
            ArrayData::I2(v) => HostValue::Int32(i32::from(*v.get(index).ok_or_else(missing)?)),
            ArrayData::UI2(v) => HostValue::Int32(i32::from(*v.get(index).ok_or_else(missing)?)),
            ArrayData::I4(v) | ArrayData::Int(v) => HostValue::Int32(*v.get(index).ok_or_else(missing)?),
            ArrayData::UI4(v) | ArrayData::UInt(v) => {
                HostValue::Uint32(*v.get(index).ok_or_else(missing)?)
            }
            ArrayData::R4(v) => HostValue::Number(f64::from(*v.get(index).ok_or_else(missing)?)),
            ArrayData::R8(v) => HostValue::Number(*v.get(index).ok_or_else(missing)?),
            ArrayData::Date(v) => self.date_to_host(*v.get(index).ok_or_else(missing)?)?,
            ArrayData::BStr(v) => match v.get(index).ok_or_else(missing)? {
                Some(s) => HostValue::String(s.to_utf8()?),
                None => HostValue::Undefined,
            },
            ArrayData::Dispatch(v) => match v.get(index).ok_or_else(missing)? {
                Some(target) => self.ctx.wrap_dispatch(target.clone())?,
                None => HostValue::Null,
            },
            ArrayData::Error(v) => self.error_value(*v.get(index).ok_or_else(missing)?),
            ArrayData::Currency(v) => self
                .ctx
                .wrap_variant(Variant::Currency(*v.get(index).ok_or_else(missing)?))?,
            ArrayData::Variant(_) => {
                return Err(BridgeError::undefined(
                    "variant elements must be converted outside the array lock",
                ))
            }
        };
        Ok(value)
    }

    fn walk_dimension(
        &self,
        array: &SafeArray,
        indices: &mut SmallVec<[i32; 4]>,
        depth: usize,
    ) -> Result<HostValue> {
        let dimension = indices.len();
        if dimension == array.dims() {
            let element = array.get_element(indices)?;
            return self.to_host(&element, depth);
        }
        let depth = self.enter(depth)?;
        let bound = array.bounds()[dimension];
        let mut items = Vec::with_capacity(bound.elements as usize);
        for offset in 0..bound.elements {
            let index = bound.index_at(offset).ok_or(ArrayError::BoundsOverflow { dimension })?;
            indices.push(index);
            let item = self.walk_dimension(array, indices, depth);
            indices.pop();
            items.push(item?);
        }
        Ok(HostValue::Array(items))
    }
}
