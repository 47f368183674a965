//! Multi-dimensional foreign arrays
//!
//! Elements are stored row-major (the last index varies fastest). The
//! descriptor carries feature flags that say how to learn the element type;
//! an explicit element type is only present when [`FADF_HAVEVARTYPE`] is set.
//!
//! Raw element access goes through [`SafeArray::access_data`], which holds a
//! lock on the array until the returned guard is dropped.

use super::date::OleDate;
use super::dispatch::DispatchRef;
use super::{Currency, VarType, Variant};
use crate::codec::BStr;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::trace;

pub const FADF_HAVEVARTYPE: u16 = 0x0080;
pub const FADF_BSTR: u16 = 0x0100;
pub const FADF_UNKNOWN: u16 = 0x0200;
pub const FADF_DISPATCH: u16 = 0x0400;
pub const FADF_VARIANT: u16 = 0x0800;

/// Array handle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    #[error("index {index} out of bounds for dimension {dimension}")]
    BadIndex { dimension: usize, index: i32 },

    #[error("expected {expected} indices, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("dimension {dimension} runs past the largest index")]
    BoundsOverflow { dimension: usize },

    #[error("bounds describe {expected} elements but storage holds {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("array is locked ({0} outstanding)")]
    Locked(u32),

    #[error("array descriptor carries no element type")]
    NoVarType,
}

/// Extent of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayBound {
    pub elements: u32,
    pub lower_bound: i32,
}

impl ArrayBound {
    pub const fn new(elements: u32, lower_bound: i32) -> Self {
        Self {
            elements,
            lower_bound,
        }
    }

    /// Index of the element `offset` places past the lower bound.
    pub fn index_at(&self, offset: u32) -> Option<i32> {
        i32::try_from(i64::from(self.lower_bound) + i64::from(offset)).ok()
    }

    fn contains(&self, index: i32) -> bool {
        let offset = i64::from(index) - i64::from(self.lower_bound);
        offset >= 0 && offset < i64::from(self.elements)
    }
}

/// Typed element storage.
#[derive(Debug, Clone)]
pub enum ArrayData {
    Bool(Vec<bool>),
    I1(Vec<i8>),
    UI1(Vec<u8>),
    I2(Vec<i16>),
    UI2(Vec<u16>),
    I4(Vec<i32>),
    UI4(Vec<u32>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    R4(Vec<f32>),
    R8(Vec<f64>),
    Currency(Vec<Currency>),
    Date(Vec<OleDate>),
    BStr(Vec<Option<BStr>>),
    Dispatch(Vec<Option<DispatchRef>>),
    Error(Vec<i32>),
    Variant(Vec<Variant>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::I1(v) => v.len(),
            ArrayData::UI1(v) => v.len(),
            ArrayData::I2(v) => v.len(),
            ArrayData::UI2(v) => v.len(),
            ArrayData::I4(v) | ArrayData::Int(v) | ArrayData::Error(v) => v.len(),
            ArrayData::UI4(v) | ArrayData::UInt(v) => v.len(),
            ArrayData::R4(v) => v.len(),
            ArrayData::R8(v) => v.len(),
            ArrayData::Currency(v) => v.len(),
            ArrayData::Date(v) => v.len(),
            ArrayData::BStr(v) => v.len(),
            ArrayData::Dispatch(v) => v.len(),
            ArrayData::Variant(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> VarType {
        match self {
            ArrayData::Bool(_) => VarType::Bool,
            ArrayData::I1(_) => VarType::I1,
            ArrayData::UI1(_) => VarType::UI1,
            ArrayData::I2(_) => VarType::I2,
            ArrayData::UI2(_) => VarType::UI2,
            ArrayData::I4(_) => VarType::I4,
            ArrayData::UI4(_) => VarType::UI4,
            ArrayData::Int(_) => VarType::Int,
            ArrayData::UInt(_) => VarType::UInt,
            ArrayData::R4(_) => VarType::R4,
            ArrayData::R8(_) => VarType::R8,
            ArrayData::Currency(_) => VarType::Currency,
            ArrayData::Date(_) => VarType::Date,
            ArrayData::BStr(_) => VarType::BStr,
            ArrayData::Dispatch(_) => VarType::Dispatch,
            ArrayData::Error(_) => VarType::Error,
            ArrayData::Variant(_) => VarType::Variant,
        }
    }

    /// Copy of the element at a flat (row-major) offset.
    pub fn get(&self, offset: usize) -> Option<Variant> {
        let value = match self {
            ArrayData::Bool(v) => Variant::Bool(*v.get(offset)?),
            ArrayData::I1(v) => Variant::I1(*v.get(offset)?),
            ArrayData::UI1(v) => Variant::UI1(*v.get(offset)?),
            ArrayData::I2(v) => Variant::I2(*v.get(offset)?),
            ArrayData::UI2(v) => Variant::UI2(*v.get(offset)?),
            ArrayData::I4(v) => Variant::I4(*v.get(offset)?),
            ArrayData::UI4(v) => Variant::UI4(*v.get(offset)?),
            ArrayData::Int(v) => Variant::Int(*v.get(offset)?),
            ArrayData::UInt(v) => Variant::UInt(*v.get(offset)?),
            ArrayData::R4(v) => Variant::R4(*v.get(offset)?),
            ArrayData::R8(v) => Variant::R8(*v.get(offset)?),
            ArrayData::Currency(v) => Variant::Currency(*v.get(offset)?),
            ArrayData::Date(v) => Variant::Date(*v.get(offset)?),
            ArrayData::BStr(v) => Variant::BStr(v.get(offset)?.clone()),
            ArrayData::Dispatch(v) => Variant::Dispatch(v.get(offset)?.clone()),
            ArrayData::Error(v) => Variant::Error(*v.get(offset)?),
            ArrayData::Variant(v) => v.get(offset)?.clone(),
        };
        Some(value)
    }
}

/// Foreign multi-dimensional array.
pub struct SafeArray {
    features: u16,
    vartype: Option<VarType>,
    /// Outermost dimension first.
    bounds: SmallVec<[ArrayBound; 2]>,
    data: ArrayData,
    locks: AtomicU32,
}

impl SafeArray {
    /// Build an array over `data` with the given bounds.
    ///
    /// Feature flags are derived from the element type the way the foreign
    /// allocator sets them.
    pub fn new(data: ArrayData, bounds: &[ArrayBound]) -> Result<Self, ArrayError> {
        // Every index of every dimension must be addressable as an i32
        if let Some(dimension) = bounds
            .iter()
            .position(|b| b.elements > 0 && b.index_at(b.elements - 1).is_none())
        {
            return Err(ArrayError::BoundsOverflow { dimension });
        }
        let expected = bounds
            .iter()
            .map(|b| b.elements as usize)
            .product::<usize>();
        let expected = if bounds.is_empty() { 0 } else { expected };
        if expected != data.len() {
            return Err(ArrayError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            features: 0,
            vartype: None,
            bounds: bounds.iter().copied().collect(),
            data,
            locks: AtomicU32::new(0),
        }
        .with_default_features())
    }

    /// One-dimensional array with lower bound 0.
    pub fn vector(data: ArrayData) -> Self {
        let bound = ArrayBound::new(data.len() as u32, 0);
        Self {
            features: 0,
            vartype: None,
            bounds: SmallVec::from_slice(&[bound]),
            data,
            locks: AtomicU32::new(0),
        }
        .with_default_features()
    }

    fn with_default_features(mut self) -> Self {
        let vartype = self.data.element_type();
        self.vartype = Some(vartype);
        self.features = match vartype {
            VarType::BStr => FADF_BSTR,
            VarType::Dispatch => FADF_DISPATCH | FADF_HAVEVARTYPE,
            VarType::Variant => FADF_VARIANT,
            _ => FADF_HAVEVARTYPE,
        };
        self
    }

    /// Override the descriptor flags. Clearing [`FADF_HAVEVARTYPE`] drops
    /// the explicit element type.
    pub fn with_features(mut self, features: u16) -> Self {
        self.features = features;
        if features & FADF_HAVEVARTYPE == 0 {
            self.vartype = None;
        }
        self
    }

    pub fn features(&self) -> u16 {
        self.features
    }

    pub fn has_feature(&self, flag: u16) -> bool {
        self.features & flag != 0
    }

    /// Explicit element type recorded in the descriptor.
    pub fn get_vartype(&self) -> Result<VarType, ArrayError> {
        if self.has_feature(FADF_HAVEVARTYPE) {
            self.vartype.ok_or(ArrayError::NoVarType)
        } else {
            Err(ArrayError::NoVarType)
        }
    }

    /// Element tag from the storage itself.
    pub fn element_type(&self) -> VarType {
        self.data.element_type()
    }

    pub fn dims(&self) -> usize {
        self.bounds.len()
    }

    pub fn bounds(&self) -> &[ArrayBound] {
        &self.bounds
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stride of one element in the foreign layout.
    pub fn element_size(&self) -> usize {
        match self.element_type() {
            VarType::Bool | VarType::I2 | VarType::UI2 => 2,
            VarType::I1 | VarType::UI1 => 1,
            VarType::I4 | VarType::UI4 | VarType::Int | VarType::UInt => 4,
            VarType::R4 | VarType::Error => 4,
            VarType::R8 | VarType::Currency | VarType::Date => 8,
            VarType::BStr | VarType::Dispatch => std::mem::size_of::<usize>(),
            _ => 16,
        }
    }

    /// Outstanding data locks.
    pub fn lock_count(&self) -> u32 {
        self.locks.load(Ordering::Acquire)
    }

    /// Lock the array and expose its raw element storage.
    pub fn access_data(&self) -> Result<ArrayAccess<'_>, ArrayError> {
        let previous = self.locks.fetch_add(1, Ordering::AcqRel);
        if previous == u32::MAX {
            self.locks.fetch_sub(1, Ordering::AcqRel);
            return Err(ArrayError::Locked(previous));
        }
        trace!(target: "array", event = "lock", locks = previous + 1);
        Ok(ArrayAccess { array: self })
    }

    /// Copy one element addressed by a full index tuple.
    pub fn get_element(&self, indices: &[i32]) -> Result<Variant, ArrayError> {
        let offset = self.offset_of(indices)?;
        self.data.get(offset).ok_or(ArrayError::BadIndex {
            dimension: self.dims().saturating_sub(1),
            index: indices.last().copied().unwrap_or_default(),
        })
    }

    /// Replace one element. The value must match the storage type.
    pub fn put_element(&mut self, indices: &[i32], value: Variant) -> Result<(), ArrayError> {
        let offset = self.offset_of(indices)?;
        let bad = ArrayError::BadIndex {
            dimension: self.dims().saturating_sub(1),
            index: indices.last().copied().unwrap_or_default(),
        };
        macro_rules! put {
            ($vec:expr, $val:expr) => {{
                let slot = $vec.get_mut(offset).ok_or(bad)?;
                *slot = $val;
                Ok(())
            }};
        }
        match (&mut self.data, value) {
            (ArrayData::Bool(v), Variant::Bool(x)) => put!(v, x),
            (ArrayData::I1(v), Variant::I1(x)) => put!(v, x),
            (ArrayData::UI1(v), Variant::UI1(x)) => put!(v, x),
            (ArrayData::I2(v), Variant::I2(x)) => put!(v, x),
            (ArrayData::UI2(v), Variant::UI2(x)) => put!(v, x),
            (ArrayData::I4(v), Variant::I4(x)) => put!(v, x),
            (ArrayData::UI4(v), Variant::UI4(x)) => put!(v, x),
            (ArrayData::Int(v), Variant::Int(x)) => put!(v, x),
            (ArrayData::UInt(v), Variant::UInt(x)) => put!(v, x),
            (ArrayData::R4(v), Variant::R4(x)) => put!(v, x),
            (ArrayData::R8(v), Variant::R8(x)) => put!(v, x),
            (ArrayData::Currency(v), Variant::Currency(x)) => put!(v, x),
            (ArrayData::Date(v), Variant::Date(x)) => put!(v, x),
            (ArrayData::BStr(v), Variant::BStr(x)) => put!(v, x),
            (ArrayData::Dispatch(v), Variant::Dispatch(x)) => put!(v, x),
            (ArrayData::Error(v), Variant::Error(x)) => put!(v, x),
            (ArrayData::Variant(v), x) => put!(v, x),
            (_, _) => Err(bad),
        }
    }

    /// Row-major flat offset of an index tuple, bounds-checked.
    fn offset_of(&self, indices: &[i32]) -> Result<usize, ArrayError> {
        if indices.len() != self.dims() {
            return Err(ArrayError::DimensionMismatch {
                expected: self.dims(),
                actual: indices.len(),
            });
        }
        let mut offset = 0usize;
        for (dimension, (bound, &index)) in self.bounds.iter().zip(indices).enumerate() {
            if !bound.contains(index) {
                return Err(ArrayError::BadIndex { dimension, index });
            }
            let local = (i64::from(index) - i64::from(bound.lower_bound)) as usize;
            offset = offset * bound.elements as usize + local;
        }
        Ok(offset)
    }
}

impl Clone for SafeArray {
    /// Deep copy. The copy starts unlocked.
    fn clone(&self) -> Self {
        Self {
            features: self.features,
            vartype: self.vartype,
            bounds: self.bounds.clone(),
            data: self.data.clone(),
            locks: AtomicU32::new(0),
        }
    }
}

impl fmt::Debug for SafeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeArray")
            .field("features", &format_args!("0x{:04X}", self.features))
            .field("vartype", &self.vartype)
            .field("bounds", &self.bounds)
            .field("data", &self.data)
            .finish()
    }
}

/// Data lock on a [`SafeArray`]; released on drop.
pub struct ArrayAccess<'a> {
    array: &'a SafeArray,
}

impl Deref for ArrayAccess<'_> {
    type Target = ArrayData;

    fn deref(&self) -> &ArrayData {
        &self.array.data
    }
}

impl Drop for ArrayAccess<'_> {
    fn drop(&mut self) {
        let previous = self.array.locks.fetch_sub(1, Ordering::AcqRel);
        trace!(target: "array", event = "unlock", locks = previous.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SafeArray {
        // 2 x 3, rows indexed from 1, columns from 0
        SafeArray::new(
            ArrayData::I4(vec![1, 2, 3, 4, 5, 6]),
            &[ArrayBound::new(2, 1), ArrayBound::new(3, 0)],
        )
        .unwrap()
    }

    #[test]
    fn test_row_major_get_element() {
        let array = grid();
        assert!(matches!(array.get_element(&[1, 0]), Ok(Variant::I4(1))));
        assert!(matches!(array.get_element(&[1, 2]), Ok(Variant::I4(3))));
        assert!(matches!(array.get_element(&[2, 0]), Ok(Variant::I4(4))));
        assert!(matches!(array.get_element(&[2, 2]), Ok(Variant::I4(6))));
    }

    #[test]
    fn test_bad_index() {
        let array = grid();
        assert_eq!(
            array.get_element(&[0, 0]).unwrap_err(),
            ArrayError::BadIndex {
                dimension: 0,
                index: 0
            }
        );
        assert_eq!(
            array.get_element(&[1]).unwrap_err(),
            ArrayError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_lock_released_by_guard() {
        let array = SafeArray::vector(ArrayData::R8(vec![1.5, 2.5]));
        {
            let data = array.access_data().unwrap();
            assert_eq!(data.len(), 2);
            assert_eq!(array.lock_count(), 1);
        }
        assert_eq!(array.lock_count(), 0);
    }

    #[test]
    fn test_put_element_rejects_locked_and_mistyped() {
        let mut array = grid();
        array.put_element(&[2, 1], Variant::I4(50)).unwrap();
        assert!(matches!(array.get_element(&[2, 1]), Ok(Variant::I4(50))));
        assert!(array.put_element(&[2, 1], Variant::R8(1.0)).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let err = SafeArray::new(ArrayData::UI1(vec![1, 2, 3]), &[ArrayBound::new(2, 0)]);
        assert!(matches!(err, Err(ArrayError::LengthMismatch { expected: 2, actual: 3 })));
    }

    #[test]
    fn test_bounds_past_largest_index() {
        let err = SafeArray::new(
            ArrayData::I4(vec![1, 2, 3, 4]),
            &[ArrayBound::new(2, 0), ArrayBound::new(2, i32::MAX)],
        );
        assert!(matches!(err, Err(ArrayError::BoundsOverflow { dimension: 1 })));

        let edge = SafeArray::new(
            ArrayData::I4(vec![1, 2]),
            &[ArrayBound::new(2, i32::MAX - 1)],
        )
        .unwrap();
        assert!(matches!(edge.get_element(&[i32::MAX]), Ok(Variant::I4(2))));
        assert_eq!(ArrayBound::new(1, i32::MAX).index_at(1), None);
        assert_eq!(ArrayBound::new(3, i32::MIN).index_at(2), Some(i32::MIN + 2));
    }

    #[test]
    fn test_features_and_vartype() {
        let strings = SafeArray::vector(ArrayData::BStr(vec![None]));
        assert!(strings.has_feature(FADF_BSTR));
        assert_eq!(strings.get_vartype(), Err(ArrayError::NoVarType));

        let numbers = SafeArray::vector(ArrayData::I2(vec![1]));
        assert_eq!(numbers.get_vartype(), Ok(VarType::I2));
        assert_eq!(numbers.element_size(), 2);
        let bare = numbers.with_features(0);
        assert_eq!(bare.get_vartype(), Err(ArrayError::NoVarType));
    }
}
