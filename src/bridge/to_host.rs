//! Foreign variant -> host value

use super::host::{HostContext, HostValue};
use super::Marshal;
use crate::errors::{BridgeError, Result};
use crate::variant::{ByRef, HResult, OleDate, Variant};
use tracing::trace;

impl<C: HostContext + ?Sized> Marshal<'_, C> {
    pub(crate) fn to_host(&self, value: &Variant, depth: usize) -> Result<HostValue> {
        let depth = self.enter(depth)?;
        match value {
            Variant::Empty | Variant::Null => Ok(HostValue::Null),
            Variant::Bool(b) => Ok(HostValue::Bool(*b)),
            Variant::I1(n) => Ok(HostValue::Int32(i32::from(*n))),
            Variant::UI1(n) => Ok(HostValue::Int32(i32::from(*n))),
            Variant::I2(n) => Ok(HostValue::Int32(i32::from(*n))),
            Variant::UI2(n) => Ok(HostValue::Int32(i32::from(*n))),
            Variant::I4(n) | Variant::Int(n) => Ok(HostValue::Int32(*n)),
            Variant::UI4(n) | Variant::UInt(n) => Ok(HostValue::Uint32(*n)),
            Variant::R4(n) => Ok(HostValue::Number(f64::from(*n))),
            Variant::R8(n) => Ok(HostValue::Number(*n)),
            Variant::Date(date) => self.date_to_host(*date),
            Variant::BStr(None) => Ok(HostValue::Undefined),
            Variant::BStr(Some(s)) => Ok(HostValue::String(s.to_utf8()?)),
            Variant::Dispatch(None) => Ok(HostValue::Null),
            Variant::Dispatch(Some(target)) => self.ctx.wrap_dispatch(target.clone()),
            Variant::Error(scode) => Ok(self.error_value(*scode)),
            Variant::Array(array) => self.array_to_host(array, depth),
            Variant::ByRef(byref) => self.byref_to_host(value, byref, depth),
            Variant::Currency(_) | Variant::Decimal(_) => self.ctx.wrap_variant(value.clone()),
        }
    }

    fn byref_to_host(&self, value: &Variant, byref: &ByRef, depth: usize) -> Result<HostValue> {
        let null_pointer =
            || BridgeError::undefined(format!("null by-reference pointer for {}", value.vt_name()));
        match byref {
            // Nested variant: convert whatever it holds
            ByRef::Variant(ptr) => {
                let target = ptr.load().ok_or_else(null_pointer)?;
                self.to_host(&target, depth)
            }
            ByRef::Array(ptr) => {
                let array = ptr.load().flatten().ok_or_else(null_pointer)?;
                self.array_to_host(&array, depth)
            }
            other => {
                let target = other.deref_value().ok_or_else(null_pointer)?;
                self.to_host(&target, depth)
            }
        }
    }

    pub(super) fn date_to_host(&self, date: OleDate) -> Result<HostValue> {
        let fields = date.to_fields().ok_or_else(|| {
            BridgeError::undefined(format!("date value {} is out of range", date.raw()))
        })?;
        let ms = self.ctx.calendar().from_local(&fields).ok_or_else(|| {
            BridgeError::undefined(format!("local time {} does not exist", date))
        })?;
        trace!(target: "bridge", event = "date_to_host", date = date.raw(), ms);
        Ok(HostValue::Date(ms as f64))
    }

    pub(super) fn error_value(&self, scode: i32) -> HostValue {
        let code = HResult::from_win32(scode);
        HostValue::Error(self.ctx.build_error(code, &code.message()))
    }
}
