//! Dynamic dispatch protocol
//!
//! [`Dispatch`] is the late-bound interface foreign objects expose: resolve a
//! member name to an id, then invoke the id with an argument block. Objects
//! are reference counted by the foreign side; [`DispatchRef`] owns exactly
//! one of those references.

use super::hresult::HResult;
use super::Variant;
use crate::codec::BStr;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Member identifier returned by name resolution.
pub type DispId = i32;

pub const DISPID_VALUE: DispId = 0;
pub const DISPID_UNKNOWN: DispId = -1;
/// Named-argument id marking the value of a property put.
pub const DISPID_PROPERTYPUT: DispId = -3;

/// Invocation kind flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvokeFlags(pub u16);

impl InvokeFlags {
    pub const METHOD: Self = Self(0x1);
    pub const PROPERTYGET: Self = Self(0x2);
    pub const PROPERTYPUT: Self = Self(0x4);
    pub const PROPERTYPUTREF: Self = Self(0x8);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Display for InvokeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::METHOD) {
            parts.push("method");
        }
        if self.contains(Self::PROPERTYGET) {
            parts.push("propget");
        }
        if self.contains(Self::PROPERTYPUT) {
            parts.push("propput");
        }
        if self.contains(Self::PROPERTYPUTREF) {
            parts.push("propputref");
        }
        f.write_str(&parts.join("|"))
    }
}

/// Argument block passed to [`Dispatch::invoke`].
///
/// `args` holds positional arguments in reverse order: the caller's last
/// argument is at index 0.
#[derive(Debug, Clone, Default)]
pub struct DispParams {
    pub args: SmallVec<[Variant; 4]>,
    pub named_args: SmallVec<[DispId; 1]>,
}

impl DispParams {
    /// Build from arguments in caller order.
    pub fn from_caller_order(args: &[Variant]) -> Self {
        Self {
            args: args.iter().rev().cloned().collect(),
            named_args: SmallVec::new(),
        }
    }

    /// Arguments in caller order.
    pub fn caller_order(&self) -> impl Iterator<Item = &Variant> {
        self.args.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Rich failure description a foreign member may fill in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcepInfo {
    /// Application-defined code; ignored when `scode` is set.
    pub code: u16,
    pub source: Option<BStr>,
    pub description: Option<BStr>,
    pub help_file: Option<BStr>,
    pub help_context: u32,
    pub scode: i32,
}

/// Failure returned from [`Dispatch::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub hresult: HResult,
    pub excep_info: Option<ExcepInfo>,
    /// Reverse-order index of the offending argument, if the callee named one.
    pub arg_err: Option<u32>,
}

impl DispatchFailure {
    pub fn new(hresult: HResult) -> Self {
        Self {
            hresult,
            excep_info: None,
            arg_err: None,
        }
    }

    pub fn exception(info: ExcepInfo) -> Self {
        Self {
            hresult: HResult::DISP_E_EXCEPTION,
            excep_info: Some(info),
            arg_err: None,
        }
    }

    pub fn with_arg_err(mut self, index: u32) -> Self {
        self.arg_err = Some(index);
        self
    }
}

impl From<HResult> for DispatchFailure {
    fn from(hresult: HResult) -> Self {
        Self::new(hresult)
    }
}

/// Late-bound foreign object.
pub trait Dispatch: Send + Sync {
    /// Take a foreign reference. Returns the new count.
    fn add_ref(&self) -> u32;

    /// Drop a foreign reference. Returns the new count.
    fn release(&self) -> u32;

    fn get_ids_of_names(&self, name: &BStr) -> Result<DispId, HResult>;

    fn invoke(
        &self,
        id: DispId,
        flags: InvokeFlags,
        params: &mut DispParams,
    ) -> Result<Variant, DispatchFailure>;

    /// Type name for diagnostics.
    fn type_name(&self) -> String {
        "IDispatch".to_string()
    }
}

/// Owning handle to one foreign reference on a [`Dispatch`] object.
///
/// Clone takes another foreign reference; drop releases the one held.
pub struct DispatchRef {
    inner: Arc<dyn Dispatch>,
}

impl DispatchRef {
    /// Adopt a reference the caller already holds.
    pub fn adopt(object: Arc<dyn Dispatch>) -> Self {
        trace!(target: "variant", event = "dispatch_adopt", object = ?Arc::as_ptr(&object));
        Self { inner: object }
    }

    /// Take a new reference on `object`.
    pub fn acquire(object: &Arc<dyn Dispatch>) -> Self {
        let count = object.add_ref();
        trace!(target: "variant", event = "dispatch_add_ref", count);
        Self {
            inner: Arc::clone(object),
        }
    }

    pub fn object(&self) -> &dyn Dispatch {
        self.inner.as_ref()
    }

    /// Same foreign object.
    pub fn ptr_eq(&self, other: &DispatchRef) -> bool {
        Arc::as_ptr(&self.inner) as *const () == Arc::as_ptr(&other.inner) as *const ()
    }

    pub fn get_ids_of_names(&self, name: &BStr) -> Result<DispId, HResult> {
        self.inner.get_ids_of_names(name)
    }

    pub fn invoke(
        &self,
        id: DispId,
        flags: InvokeFlags,
        params: &mut DispParams,
    ) -> Result<Variant, DispatchFailure> {
        self.inner.invoke(id, flags, params)
    }
}

impl Clone for DispatchRef {
    fn clone(&self) -> Self {
        Self::acquire(&self.inner)
    }
}

impl Drop for DispatchRef {
    fn drop(&mut self) {
        let count = self.inner.release();
        trace!(target: "variant", event = "dispatch_release", count);
    }
}

impl fmt::Debug for DispatchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchRef({} @ {:p})", self.inner.type_name(), Arc::as_ptr(&self.inner))
    }
}
