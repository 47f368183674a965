//! Host wrappers for foreign values
//!
//! Each wrapper owns its foreign payload until it is finalized. Finalizing
//! happens at most once, either explicitly or on drop, and releases the
//! payload; later attempts to unwrap fail.

use super::host::{HostObject, Unwrapped};
use crate::errors::{BridgeError, Result};
use crate::variant::{DispatchRef, Variant};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Host object holding a copy of a foreign value.
pub struct VariantObject {
    value: Mutex<Variant>,
    finalized: AtomicBool,
}

impl VariantObject {
    pub fn new(value: Variant) -> Self {
        Self {
            value: Mutex::new(value),
            finalized: AtomicBool::new(false),
        }
    }

    /// Copy of the held value.
    pub fn variant(&self) -> Result<Variant> {
        if self.is_finalized() {
            return Err(BridgeError::unsupported(
                "Saw a variant object, but couldn't pull private data",
            ));
        }
        Ok(self.value.lock().clone())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Release the held value. Returns whether this call did the release.
    pub fn finalize(&self) -> bool {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut value = self.value.lock();
        trace!(target: "bridge", event = "finalize_variant", vt = value.vt());
        value.clear();
        true
    }
}

impl Drop for VariantObject {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl fmt::Debug for VariantObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantObject")
            .field("value", &*self.value.lock())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

impl HostObject for VariantObject {
    fn class_name(&self) -> &str {
        "Variant"
    }

    fn unwrap_foreign(&self) -> Result<Unwrapped> {
        self.variant().map(Unwrapped::Variant)
    }

    fn display_string(&self) -> Option<String> {
        if self.is_finalized() {
            return None;
        }
        Some(self.value.lock().to_string())
    }
}

/// Host object holding one reference on a dispatch object.
pub struct DispatchObject {
    target: Mutex<Option<DispatchRef>>,
}

impl DispatchObject {
    pub fn new(target: DispatchRef) -> Self {
        Self {
            target: Mutex::new(Some(target)),
        }
    }

    /// New reference on the wrapped object.
    pub fn dispatch(&self) -> Result<DispatchRef> {
        self.target.lock().clone().ok_or_else(|| {
            BridgeError::unsupported("Saw a dispatch object, but couldn't pull private data")
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.target.lock().is_none()
    }

    /// Release the held reference. Returns whether this call did the release.
    pub fn finalize(&self) -> bool {
        let released = self.target.lock().take();
        match released {
            Some(target) => {
                trace!(target: "bridge", event = "finalize_dispatch", object = ?target);
                drop(target);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for DispatchObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DispatchObject")
            .field(&*self.target.lock())
            .finish()
    }
}

impl HostObject for DispatchObject {
    fn class_name(&self) -> &str {
        "Dispatch"
    }

    fn unwrap_foreign(&self) -> Result<Unwrapped> {
        self.dispatch().map(Unwrapped::Dispatch)
    }

    fn display_string(&self) -> Option<String> {
        let target = self.target.lock();
        let name = target.as_ref()?.object().type_name();
        Some(format!("[object {}]", name))
    }
}
