//! Host value -> foreign variant

use super::host::{HostContext, HostObjectRef, HostValue, Unwrapped};
use super::Marshal;
use crate::errors::{BridgeError, Result};
use crate::variant::{OleDate, Variant};
use tracing::trace;

impl<C: HostContext + ?Sized> Marshal<'_, C> {
    pub(crate) fn to_variant(&self, value: &HostValue) -> Result<Variant> {
        self.host_to_variant(value, true)
    }

    fn host_to_variant(&self, value: &HostValue, may_resolve: bool) -> Result<Variant> {
        match value {
            HostValue::Undefined | HostValue::Null => Ok(Variant::Empty),
            HostValue::External | HostValue::Error(_) | HostValue::Function(_) => {
                Err(BridgeError::unsupported(format!(
                    "Cannot pass a {} value to OLE",
                    value.kind()
                )))
            }
            HostValue::Bool(b) => Ok(Variant::Bool(*b)),
            HostValue::Array(_) => Err(BridgeError::unsupported(
                "Passing arrays to OLE is not currently supported",
            )),
            HostValue::Int32(n) => Ok(Variant::I4(*n)),
            HostValue::Uint32(n) => Ok(Variant::UI4(*n)),
            HostValue::Number(n) => Ok(Variant::R8(*n)),
            HostValue::Date(ms) => self.date_to_variant(*ms),
            HostValue::String(s) => Ok(Variant::string(s)),
            HostValue::Object(obj) => self.object_to_variant(obj, may_resolve),
        }
    }

    fn date_to_variant(&self, ms: f64) -> Result<Variant> {
        let unconvertible = || BridgeError::unsupported("Saw a date, but couldn't convert it to an OLE value");
        if !ms.is_finite() {
            return Err(unconvertible());
        }
        let fields = self
            .ctx
            .calendar()
            .to_local(ms.floor() as i64)
            .ok_or_else(unconvertible)?;
        let date = OleDate::from_fields(&fields).ok_or_else(unconvertible)?;
        trace!(target: "bridge", event = "date_to_variant", ms, date = date.raw());
        Ok(Variant::Date(date))
    }

    fn object_to_variant(&self, obj: &HostObjectRef, may_resolve: bool) -> Result<Variant> {
        match obj.unwrap_foreign()? {
            Unwrapped::Variant(value) => Ok(value),
            Unwrapped::Dispatch(target) => Ok(Variant::Dispatch(Some(target))),
            Unwrapped::NotForeign => {
                if may_resolve {
                    if let Some(resolved) = obj.resolve_value() {
                        trace!(target: "bridge", event = "resolve_value", class = obj.class_name());
                        return self.host_to_variant(&resolved, false);
                    }
                }
                match obj.display_string() {
                    Some(text) => Err(BridgeError::unsupported(format!(
                        "Cannot interpret {} as a valid OLE value",
                        text
                    ))),
                    None => Err(BridgeError::unsupported("Unable to convert argument to OLE")),
                }
            }
        }
    }
}
