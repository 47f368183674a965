//! By-reference payloads
//!
//! A by-reference variant points at storage it does not own. Storage lives
//! in a [`Slot`]; the variant holds a [`Pointer`] that dangles once the slot
//! is dropped, which is how a null or stale foreign pointer is observed.

use super::array::SafeArray;
use super::date::OleDate;
use super::dispatch::DispatchRef;
use super::{Currency, VarType, Variant};
use crate::codec::BStr;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Owned storage a by-reference variant can point into.
pub type Slot<T> = Arc<RwLock<T>>;

pub fn slot<T>(value: T) -> Slot<T> {
    Arc::new(RwLock::new(value))
}

/// Non-owning pointer to a [`Slot`].
pub struct Pointer<T>(Weak<RwLock<T>>);

impl<T> Pointer<T> {
    pub fn to(slot: &Slot<T>) -> Self {
        Self(Arc::downgrade(slot))
    }

    pub fn null() -> Self {
        Self(Weak::new())
    }

    pub fn is_null(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Write through the pointer. `false` if it is null.
    pub fn store(&self, value: T) -> bool {
        match self.0.upgrade() {
            Some(slot) => {
                *slot.write() = value;
                true
            }
            None => false,
        }
    }
}

impl<T: Clone> Pointer<T> {
    /// Copy the pointee out. `None` if the pointer is null.
    pub fn load(&self) -> Option<T> {
        self.0.upgrade().map(|slot| slot.read().clone())
    }
}

impl<T> Clone for Pointer<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Pointer(null)")
        } else {
            write!(f, "Pointer({:p})", self.0.as_ptr())
        }
    }
}

/// Payload of a by-reference variant, one pointer type per element tag.
#[derive(Debug, Clone)]
pub enum ByRef {
    Bool(Pointer<bool>),
    I1(Pointer<i8>),
    UI1(Pointer<u8>),
    I2(Pointer<i16>),
    UI2(Pointer<u16>),
    I4(Pointer<i32>),
    UI4(Pointer<u32>),
    Int(Pointer<i32>),
    UInt(Pointer<u32>),
    R4(Pointer<f32>),
    R8(Pointer<f64>),
    Currency(Pointer<Currency>),
    Date(Pointer<OleDate>),
    BStr(Pointer<Option<BStr>>),
    Dispatch(Pointer<Option<DispatchRef>>),
    Error(Pointer<i32>),
    Variant(Pointer<Variant>),
    Array(Pointer<Option<SafeArray>>),
}

impl ByRef {
    /// Tag of the referenced value, without the by-reference flag.
    pub fn base_type(&self) -> VarType {
        match self {
            ByRef::Bool(_) => VarType::Bool,
            ByRef::I1(_) => VarType::I1,
            ByRef::UI1(_) => VarType::UI1,
            ByRef::I2(_) => VarType::I2,
            ByRef::UI2(_) => VarType::UI2,
            ByRef::I4(_) => VarType::I4,
            ByRef::UI4(_) => VarType::UI4,
            ByRef::Int(_) => VarType::Int,
            ByRef::UInt(_) => VarType::UInt,
            ByRef::R4(_) => VarType::R4,
            ByRef::R8(_) => VarType::R8,
            ByRef::Currency(_) => VarType::Currency,
            ByRef::Date(_) => VarType::Date,
            ByRef::BStr(_) => VarType::BStr,
            ByRef::Dispatch(_) => VarType::Dispatch,
            ByRef::Error(_) => VarType::Error,
            ByRef::Variant(_) => VarType::Variant,
            ByRef::Array(_) => VarType::Variant,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            ByRef::Bool(p) => p.is_null(),
            ByRef::I1(p) => p.is_null(),
            ByRef::UI1(p) => p.is_null(),
            ByRef::I2(p) => p.is_null(),
            ByRef::UI2(p) => p.is_null(),
            ByRef::I4(p) | ByRef::Int(p) | ByRef::Error(p) => p.is_null(),
            ByRef::UI4(p) | ByRef::UInt(p) => p.is_null(),
            ByRef::R4(p) => p.is_null(),
            ByRef::R8(p) => p.is_null(),
            ByRef::Currency(p) => p.is_null(),
            ByRef::Date(p) => p.is_null(),
            ByRef::BStr(p) => p.is_null(),
            ByRef::Dispatch(p) => p.is_null(),
            ByRef::Variant(p) => p.is_null(),
            ByRef::Array(p) => p.is_null(),
        }
    }

    /// Copy the referenced value into a direct variant.
    ///
    /// `None` if the pointer is null, or for an array reference whose
    /// handle is null.
    pub fn deref_value(&self) -> Option<Variant> {
        let value = match self {
            ByRef::Bool(p) => Variant::Bool(p.load()?),
            ByRef::I1(p) => Variant::I1(p.load()?),
            ByRef::UI1(p) => Variant::UI1(p.load()?),
            ByRef::I2(p) => Variant::I2(p.load()?),
            ByRef::UI2(p) => Variant::UI2(p.load()?),
            ByRef::I4(p) => Variant::I4(p.load()?),
            ByRef::UI4(p) => Variant::UI4(p.load()?),
            ByRef::Int(p) => Variant::Int(p.load()?),
            ByRef::UInt(p) => Variant::UInt(p.load()?),
            ByRef::R4(p) => Variant::R4(p.load()?),
            ByRef::R8(p) => Variant::R8(p.load()?),
            ByRef::Currency(p) => Variant::Currency(p.load()?),
            ByRef::Date(p) => Variant::Date(p.load()?),
            ByRef::BStr(p) => Variant::BStr(p.load()?),
            ByRef::Dispatch(p) => Variant::Dispatch(p.load()?),
            ByRef::Error(p) => Variant::Error(p.load()?),
            ByRef::Variant(p) => p.load()?,
            ByRef::Array(p) => Variant::Array(p.load()??),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_dangles_after_slot_drop() {
        let storage = slot(7i32);
        let ptr = Pointer::to(&storage);
        assert_eq!(ptr.load(), Some(7));
        assert!(ptr.store(9));
        assert_eq!(*storage.read(), 9);

        drop(storage);
        assert!(ptr.is_null());
        assert_eq!(ptr.load(), None);
        assert!(!ptr.store(1));
    }

    #[test]
    fn test_deref_value() {
        let storage = slot(Some(BStr::from("out")));
        let byref = ByRef::BStr(Pointer::to(&storage));
        assert!(matches!(byref.deref_value(), Some(Variant::BStr(Some(_)))));
        assert!(ByRef::R8(Pointer::null()).deref_value().is_none());

        let empty_array = slot(None);
        assert!(ByRef::Array(Pointer::to(&empty_array)).deref_value().is_none());
    }
}
