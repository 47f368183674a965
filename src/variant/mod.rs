//! Tagged variant values
//!
//! [`Variant`] is the foreign side's self-describing value: a type tag plus a
//! payload. Payloads that own foreign resources (string handles, dispatch
//! references, arrays) release them when the variant is cleared or dropped.
//! By-reference variants point at storage they do not own and release
//! nothing.

pub mod array;
pub mod byref;
pub mod date;
pub mod dispatch;
pub mod hresult;

pub use array::{ArrayBound, ArrayData, ArrayError, SafeArray};
pub use byref::{slot, ByRef, Pointer, Slot};
pub use date::{CalendarFields, OleDate};
pub use dispatch::{
    DispId, DispParams, Dispatch, DispatchFailure, DispatchRef, ExcepInfo, InvokeFlags,
};
pub use hresult::HResult;

use crate::codec::BStr;
use crate::errors::{BridgeError, Result};
use crate::invoke;
use std::fmt;
use tracing::trace;

pub const VT_ARRAY: u16 = 0x2000;
pub const VT_BYREF: u16 = 0x4000;

/// Base type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VarType {
    Empty = 0,
    Null = 1,
    I2 = 2,
    I4 = 3,
    R4 = 4,
    R8 = 5,
    Currency = 6,
    Date = 7,
    BStr = 8,
    Dispatch = 9,
    Error = 10,
    Bool = 11,
    Variant = 12,
    Unknown = 13,
    Decimal = 14,
    I1 = 16,
    UI1 = 17,
    UI2 = 18,
    UI4 = 19,
    I8 = 20,
    UI8 = 21,
    Int = 22,
    UInt = 23,
}

impl VarType {
    pub fn name(self) -> &'static str {
        match self {
            VarType::Empty => "VT_EMPTY",
            VarType::Null => "VT_NULL",
            VarType::I2 => "VT_I2",
            VarType::I4 => "VT_I4",
            VarType::R4 => "VT_R4",
            VarType::R8 => "VT_R8",
            VarType::Currency => "VT_CY",
            VarType::Date => "VT_DATE",
            VarType::BStr => "VT_BSTR",
            VarType::Dispatch => "VT_DISPATCH",
            VarType::Error => "VT_ERROR",
            VarType::Bool => "VT_BOOL",
            VarType::Variant => "VT_VARIANT",
            VarType::Unknown => "VT_UNKNOWN",
            VarType::Decimal => "VT_DECIMAL",
            VarType::I1 => "VT_I1",
            VarType::UI1 => "VT_UI1",
            VarType::UI2 => "VT_UI2",
            VarType::UI4 => "VT_UI4",
            VarType::I8 => "VT_I8",
            VarType::UI8 => "VT_UI8",
            VarType::Int => "VT_INT",
            VarType::UInt => "VT_UINT",
        }
    }
}

/// Fixed-point currency, scaled by 10 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(pub i64);

impl Currency {
    pub const SCALE: i64 = 10_000;

    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = (value * Self::SCALE as f64).round();
        if scaled.is_finite() && scaled >= i64::MIN as f64 && scaled <= i64::MAX as f64 {
            Some(Self(scaled as i64))
        } else {
            None
        }
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

/// 96-bit scaled decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    /// Power of ten the mantissa is divided by, 0 through 28.
    pub scale: u8,
    pub negative: bool,
    /// Only the low 96 bits are significant.
    pub mantissa: u128,
}

impl Decimal {
    pub fn to_f64(self) -> f64 {
        let magnitude = (self.mantissa & ((1u128 << 96) - 1)) as f64 / 10f64.powi(i32::from(self.scale));
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

/// Self-describing foreign value.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Empty,
    Null,
    Bool(bool),
    I1(i8),
    UI1(u8),
    I2(i16),
    UI2(u16),
    I4(i32),
    UI4(u32),
    Int(i32),
    UInt(u32),
    R4(f32),
    R8(f64),
    Currency(Currency),
    Decimal(Decimal),
    Date(OleDate),
    /// String handle; `None` is the null handle.
    BStr(Option<BStr>),
    /// Dispatch reference; `None` is the null reference.
    Dispatch(Option<DispatchRef>),
    /// Status code carried as a value.
    Error(i32),
    Array(SafeArray),
    ByRef(ByRef),
}

impl Variant {
    /// String variant from UTF-8 text.
    pub fn string(text: &str) -> Self {
        Variant::BStr(Some(BStr::from(text)))
    }

    pub fn date(value: OleDate) -> Self {
        Variant::Date(value)
    }

    pub fn dispatch(object: DispatchRef) -> Self {
        Variant::Dispatch(Some(object))
    }

    /// Base tag, without array or by-reference flags.
    pub fn var_type(&self) -> VarType {
        match self {
            Variant::Empty => VarType::Empty,
            Variant::Null => VarType::Null,
            Variant::Bool(_) => VarType::Bool,
            Variant::I1(_) => VarType::I1,
            Variant::UI1(_) => VarType::UI1,
            Variant::I2(_) => VarType::I2,
            Variant::UI2(_) => VarType::UI2,
            Variant::I4(_) => VarType::I4,
            Variant::UI4(_) => VarType::UI4,
            Variant::Int(_) => VarType::Int,
            Variant::UInt(_) => VarType::UInt,
            Variant::R4(_) => VarType::R4,
            Variant::R8(_) => VarType::R8,
            Variant::Currency(_) => VarType::Currency,
            Variant::Decimal(_) => VarType::Decimal,
            Variant::Date(_) => VarType::Date,
            Variant::BStr(_) => VarType::BStr,
            Variant::Dispatch(_) => VarType::Dispatch,
            Variant::Error(_) => VarType::Error,
            Variant::Array(a) => a.element_type(),
            Variant::ByRef(ByRef::Array(p)) => p
                .load()
                .flatten()
                .map(|a| a.element_type())
                .unwrap_or(VarType::Variant),
            Variant::ByRef(r) => r.base_type(),
        }
    }

    /// Full numeric tag including flags.
    pub fn vt(&self) -> u16 {
        let base = self.var_type() as u16;
        match self {
            Variant::Array(_) => VT_ARRAY | base,
            Variant::ByRef(ByRef::Array(_)) => VT_BYREF | VT_ARRAY | base,
            Variant::ByRef(_) => VT_BYREF | base,
            _ => base,
        }
    }

    /// Symbolic tag name, flags first.
    pub fn vt_name(&self) -> String {
        let vt = self.vt();
        let mut name = String::new();
        if vt & VT_BYREF != 0 {
            name.push_str("VT_BYREF|");
        }
        if vt & VT_ARRAY != 0 {
            name.push_str("VT_ARRAY|");
        }
        name.push_str(self.var_type().name());
        name
    }

    pub fn is_a(&self, vt: u16) -> bool {
        self.vt() == vt
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, Variant::ByRef(_))
    }

    /// Release owned resources and reset to empty. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if !self.is_empty() {
            trace!(target: "variant", event = "clear", vt = self.vt());
        }
        *self = Variant::Empty;
    }

    /// Take the value out, leaving empty behind.
    pub fn take(&mut self) -> Variant {
        std::mem::take(self)
    }

    /// Follow a by-reference variant to a direct copy of its target.
    pub fn deref_value(&self) -> Result<Variant> {
        match self {
            Variant::ByRef(r) => r.deref_value().ok_or_else(|| {
                BridgeError::UndefinedResult(format!("null by-reference pointer for {}", self.vt_name()))
            }),
            other => Ok(other.clone()),
        }
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self.deref_value()? {
            Variant::Bool(b) => Ok(b),
            other => match other.integer() {
                Some(n) => Ok(n != 0),
                None => Err(mismatch("VT_BOOL", &other)),
            },
        }
    }

    pub fn to_i32(&self) -> Result<i32> {
        let value = self.deref_value()?;
        value
            .integer()
            .ok_or_else(|| mismatch("VT_I4", &value))
            .and_then(|n| i32::try_from(n).map_err(|_| mismatch("VT_I4", &value)))
    }

    pub fn to_f64(&self) -> Result<f64> {
        let value = self.deref_value()?;
        match value {
            Variant::R8(f) => Ok(f),
            Variant::R4(f) => Ok(f64::from(f)),
            Variant::Currency(c) => Ok(c.to_f64()),
            Variant::Decimal(d) => Ok(d.to_f64()),
            ref other => other
                .integer()
                .map(|n| n as f64)
                .ok_or_else(|| mismatch("VT_R8", other)),
        }
    }

    pub fn to_date(&self) -> Result<OleDate> {
        match self.deref_value()? {
            Variant::Date(d) => Ok(d),
            other => Err(mismatch("VT_DATE", &other)),
        }
    }

    /// String payload as UTF-8. `None` for the null handle.
    pub fn to_utf8(&self) -> Result<Option<String>> {
        match self.deref_value()? {
            Variant::BStr(Some(s)) => Ok(Some(s.to_utf8()?)),
            Variant::BStr(None) => Ok(None),
            other => Err(mismatch("VT_BSTR", &other)),
        }
    }

    /// Dispatch reference held by this variant, directly or by reference.
    pub fn as_dispatch(&self) -> Result<DispatchRef> {
        match self.deref_value()? {
            Variant::Dispatch(Some(d)) => Ok(d),
            other => Err(mismatch("VT_DISPATCH", &other)),
        }
    }

    /// Read a property of the dispatch object this variant holds.
    pub fn get_prop(&self, name: &str, args: &[Variant]) -> Result<Variant> {
        invoke::get_prop(&self.as_dispatch()?, name, args)
    }

    /// Write a property; the last argument is the value.
    pub fn put_prop(&self, name: &str, args: &[Variant]) -> Result<Variant> {
        invoke::put_prop(&self.as_dispatch()?, name, args)
    }

    /// Call a method, retrying once as a property read if the member is
    /// not a method.
    pub fn invoke(&self, name: &str, args: &[Variant]) -> Result<Variant> {
        invoke::invoke(&self.as_dispatch()?, name, args, true)
    }

    /// Widened integer payload for every integral tag.
    fn integer(&self) -> Option<i64> {
        match *self {
            Variant::I1(n) => Some(i64::from(n)),
            Variant::UI1(n) => Some(i64::from(n)),
            Variant::I2(n) => Some(i64::from(n)),
            Variant::UI2(n) => Some(i64::from(n)),
            Variant::I4(n) | Variant::Int(n) => Some(i64::from(n)),
            Variant::UI4(n) | Variant::UInt(n) => Some(i64::from(n)),
            _ => None,
        }
    }
}

fn mismatch(expected: &'static str, found: &Variant) -> BridgeError {
    BridgeError::TypeMismatch {
        expected,
        found: found.vt_name(),
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::I4(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UI4(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::R8(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::string(value)
    }
}

impl From<BStr> for Variant {
    fn from(value: BStr) -> Self {
        Variant::BStr(Some(value))
    }
}

impl From<DispatchRef> for Variant {
    fn from(value: DispatchRef) -> Self {
        Variant::Dispatch(Some(value))
    }
}

impl From<SafeArray> for Variant {
    fn from(value: SafeArray) -> Self {
        Variant::Array(value)
    }
}

impl From<OleDate> for Variant {
    fn from(value: OleDate) -> Self {
        Variant::Date(value)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => Ok(()),
            Variant::Null => f.write_str("null"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::R4(x) => write!(f, "{}", x),
            Variant::R8(x) => write!(f, "{}", x),
            Variant::Currency(c) => write!(f, "{}", c.to_f64()),
            Variant::Decimal(d) => write!(f, "{}", d.to_f64()),
            Variant::Date(d) => write!(f, "{}", d),
            Variant::BStr(Some(s)) => f.write_str(&s.to_string_lossy()),
            Variant::BStr(None) => Ok(()),
            Variant::Error(code) => write!(f, "{}", HResult(*code)),
            Variant::Dispatch(Some(d)) => write!(f, "{:?}", d),
            Variant::Dispatch(None) => f.write_str("null"),
            Variant::Array(a) => write!(f, "[{} x {}]", a.len(), a.element_type().name()),
            Variant::ByRef(_) => write!(f, "<{}>", self.vt_name()),
            other => match other.integer() {
                Some(n) => write!(f, "{}", n),
                None => write!(f, "<{}>", other.vt_name()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_is_idempotent() {
        let mut value = Variant::string("text");
        value.clear();
        assert!(value.is_empty());
        value.clear();
        assert!(value.is_empty());
    }

    #[test]
    fn test_vt_and_names() {
        assert_eq!(Variant::I4(1).vt(), 3);
        assert_eq!(Variant::UI4(1).vt(), 19);
        assert_eq!(Variant::Int(1).vt(), 22);
        assert_eq!(Variant::string("x").vt_name(), "VT_BSTR");

        let array = Variant::Array(SafeArray::vector(ArrayData::R8(vec![1.0])));
        assert_eq!(array.vt(), VT_ARRAY | VarType::R8 as u16);
        assert_eq!(array.vt_name(), "VT_ARRAY|VT_R8");

        let storage = slot(5i32);
        let byref = Variant::ByRef(ByRef::I4(Pointer::to(&storage)));
        assert_eq!(byref.vt(), VT_BYREF | 3);
        assert!(byref.is_a(VT_BYREF | 3));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Variant::UI2(7).to_i32().unwrap(), 7);
        assert!(Variant::UI4(u32::MAX).to_i32().is_err());
        assert_eq!(Variant::I2(-3).to_f64().unwrap(), -3.0);
        assert!(Variant::I4(1).to_bool().unwrap());
        assert_eq!(Variant::string("hé").to_utf8().unwrap().as_deref(), Some("hé"));
        assert_eq!(Variant::BStr(None).to_utf8().unwrap(), None);
        assert!(matches!(
            Variant::R8(1.0).to_utf8(),
            Err(BridgeError::TypeMismatch { expected: "VT_BSTR", .. })
        ));
    }

    #[test]
    fn test_byref_accessors() {
        let storage = slot(2.5f64);
        let byref = Variant::ByRef(ByRef::R8(Pointer::to(&storage)));
        assert_eq!(byref.to_f64().unwrap(), 2.5);
        drop(storage);
        assert!(matches!(byref.to_f64(), Err(BridgeError::UndefinedResult(_))));
    }

    #[test]
    fn test_currency_and_decimal() {
        let cy = Currency::from_f64(12.3456).unwrap();
        assert_eq!(cy, Currency(123_456));
        assert_eq!(Variant::Currency(cy).to_f64().unwrap(), 12.3456);

        let dec = Decimal {
            scale: 2,
            negative: true,
            mantissa: 1250,
        };
        assert_eq!(dec.to_f64(), -12.5);
    }

    #[test]
    fn test_display() {
        assert_eq!(Variant::I4(42).to_string(), "42");
        assert_eq!(Variant::R8(1.5).to_string(), "1.5");
        assert_eq!(Variant::string("abc").to_string(), "abc");
        assert_eq!(Variant::Error(HResult::E_FAIL.0).to_string(), "0x80004005");
    }
}
