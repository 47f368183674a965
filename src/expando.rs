//! In-process dispatch objects
//!
//! [`ExpandoObject`] implements [`Dispatch`] over a table of named members
//! built at runtime: plain properties, closure-backed methods, and indexed
//! properties. Names resolve case-insensitively. It serves callers that need
//! to hand a late-bound object to code expecting a foreign one.

use crate::codec::BStr;
use crate::variant::dispatch::DISPID_PROPERTYPUT;
use crate::variant::{
    DispId, DispParams, Dispatch, DispatchFailure, DispatchRef, HResult, InvokeFlags, Variant,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Method body. Receives arguments in caller order.
pub type MethodFn = Arc<dyn Fn(&[Variant]) -> Result<Variant, DispatchFailure> + Send + Sync>;

/// Indexed getter. Receives the indices in caller order.
pub type IndexGetFn = Arc<dyn Fn(&[Variant]) -> Result<Variant, DispatchFailure> + Send + Sync>;

/// Indexed setter. Receives the indices in caller order, then the value.
pub type IndexPutFn = Arc<dyn Fn(&[Variant], Variant) -> Result<(), DispatchFailure> + Send + Sync>;

enum Member {
    Property(RwLock<Variant>),
    Method {
        arity: Option<usize>,
        body: MethodFn,
    },
    Indexed {
        get: IndexGetFn,
        put: Option<IndexPutFn>,
    },
}

/// One invocation as the object received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub member: String,
    pub id: DispId,
    pub flags: InvokeFlags,
    /// Positional arguments exactly as passed, i.e. in reverse order.
    pub raw_args: Vec<Variant>,
    pub named_args: Vec<DispId>,
}

/// Dispatch object with a runtime-built member table.
pub struct ExpandoObject {
    type_name: String,
    ids: DashMap<String, DispId>,
    names: DashMap<DispId, String>,
    members: DashMap<DispId, Arc<Member>>,
    next_id: AtomicI32,
    refs: AtomicU32,
    recorder: Option<Mutex<Vec<RecordedCall>>>,
}

impl ExpandoObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ids: DashMap::new(),
            names: DashMap::new(),
            members: DashMap::new(),
            next_id: AtomicI32::new(1),
            refs: AtomicU32::new(1),
            recorder: None,
        }
    }

    /// Keep a log of every invocation, see [`ExpandoObject::calls`].
    pub fn recording(mut self) -> Self {
        self.recorder = Some(Mutex::new(Vec::new()));
        self
    }

    pub fn with_property(self, name: &str, value: impl Into<Variant>) -> Self {
        self.define(name, Member::Property(RwLock::new(value.into())));
        self
    }

    /// Add a method. `arity` of `None` accepts any argument count.
    pub fn with_method<F>(self, name: &str, arity: Option<usize>, body: F) -> Self
    where
        F: Fn(&[Variant]) -> Result<Variant, DispatchFailure> + Send + Sync + 'static,
    {
        self.define(
            name,
            Member::Method {
                arity,
                body: Arc::new(body),
            },
        );
        self
    }

    /// Add a read-only indexed property.
    pub fn with_indexed<G>(self, name: &str, get: G) -> Self
    where
        G: Fn(&[Variant]) -> Result<Variant, DispatchFailure> + Send + Sync + 'static,
    {
        self.define(
            name,
            Member::Indexed {
                get: Arc::new(get),
                put: None,
            },
        );
        self
    }

    pub fn with_indexed_mut<G, P>(self, name: &str, get: G, put: P) -> Self
    where
        G: Fn(&[Variant]) -> Result<Variant, DispatchFailure> + Send + Sync + 'static,
        P: Fn(&[Variant], Variant) -> Result<(), DispatchFailure> + Send + Sync + 'static,
    {
        self.define(
            name,
            Member::Indexed {
                get: Arc::new(get),
                put: Some(Arc::new(put)),
            },
        );
        self
    }

    fn define(&self, name: &str, member: Member) {
        let key = name.to_lowercase();
        let id = *self
            .ids
            .entry(key)
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        self.names.insert(id, name.to_string());
        self.members.insert(id, Arc::new(member));
    }

    /// Current value of a plain property.
    pub fn property(&self, name: &str) -> Option<Variant> {
        let id = *self.ids.get(&name.to_lowercase())?;
        match self.members.get(&id)?.value().as_ref() {
            Member::Property(value) => Some(value.read().clone()),
            _ => None,
        }
    }

    /// Outstanding foreign references.
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Invocations received so far. Empty unless recording.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorder
            .as_ref()
            .map(|r| r.lock().clone())
            .unwrap_or_default()
    }

    /// Hand out the initial reference as a [`DispatchRef`].
    pub fn into_dispatch(self: Arc<Self>) -> DispatchRef {
        DispatchRef::adopt(self)
    }

    fn record(&self, id: DispId, flags: InvokeFlags, params: &DispParams) {
        if let Some(recorder) = &self.recorder {
            let member = self
                .names
                .get(&id)
                .map(|n| n.value().clone())
                .unwrap_or_default();
            recorder.lock().push(RecordedCall {
                member,
                id,
                flags,
                raw_args: params.args.to_vec(),
                named_args: params.named_args.to_vec(),
            });
        }
    }
}

fn is_property_put(flags: InvokeFlags, params: &DispParams) -> bool {
    flags.contains(InvokeFlags::PROPERTYPUT)
        && params.named_args.as_slice() == [DISPID_PROPERTYPUT]
}

impl Dispatch for ExpandoObject {
    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) -> u32 {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            trace!(target: "variant", event = "expando_final_release", type_name = %self.type_name);
        }
        previous.saturating_sub(1)
    }

    fn get_ids_of_names(&self, name: &BStr) -> Result<DispId, HResult> {
        let name = name.to_utf8().map_err(|_| HResult::DISP_E_UNKNOWNNAME)?;
        self.ids
            .get(&name.to_lowercase())
            .map(|id| *id)
            .ok_or(HResult::DISP_E_UNKNOWNNAME)
    }

    fn invoke(
        &self,
        id: DispId,
        flags: InvokeFlags,
        params: &mut DispParams,
    ) -> Result<Variant, DispatchFailure> {
        self.record(id, flags, params);
        let member = self
            .members
            .get(&id)
            .map(|m| Arc::clone(m.value()))
            .ok_or(HResult::DISP_E_MEMBERNOTFOUND)?;
        let caller: Vec<Variant> = params.caller_order().cloned().collect();

        match member.as_ref() {
            Member::Property(value) => {
                if is_property_put(flags, params) {
                    let [new_value] = caller.as_slice() else {
                        return Err(HResult::DISP_E_BADPARAMCOUNT.into());
                    };
                    *value.write() = new_value.clone();
                    Ok(Variant::Empty)
                } else if flags.contains(InvokeFlags::PROPERTYGET) {
                    if !caller.is_empty() {
                        return Err(HResult::DISP_E_BADPARAMCOUNT.into());
                    }
                    Ok(value.read().clone())
                } else {
                    Err(HResult::DISP_E_MEMBERNOTFOUND.into())
                }
            }
            Member::Method { arity, body } => {
                if !flags.contains(InvokeFlags::METHOD) {
                    return Err(HResult::DISP_E_MEMBERNOTFOUND.into());
                }
                if arity.is_some_and(|n| n != caller.len()) {
                    return Err(HResult::DISP_E_BADPARAMCOUNT.into());
                }
                body(&caller)
            }
            Member::Indexed { get, put } => {
                if is_property_put(flags, params) {
                    let put = put.as_ref().ok_or(HResult::DISP_E_MEMBERNOTFOUND)?;
                    let Some((value, indices)) = caller.split_last() else {
                        return Err(HResult::DISP_E_BADPARAMCOUNT.into());
                    };
                    put(indices, value.clone())?;
                    Ok(Variant::Empty)
                } else if flags.contains(InvokeFlags::PROPERTYGET) {
                    get(&caller)
                } else {
                    Err(HResult::DISP_E_MEMBERNOTFOUND.into())
                }
            }
        }
    }

    fn type_name(&self) -> String {
        self.type_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(object: &ExpandoObject, name: &str) -> Result<DispId, HResult> {
        object.get_ids_of_names(&BStr::from(name))
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let object = ExpandoObject::new("Sheet").with_property("Name", "Sheet1");
        assert_eq!(lookup(&object, "name"), lookup(&object, "NAME"));
        assert_eq!(lookup(&object, "Missing"), Err(HResult::DISP_E_UNKNOWNNAME));
    }

    #[test]
    fn test_property_get_and_put() {
        let object = ExpandoObject::new("Cell").with_property("Value", 1);
        let id = lookup(&object, "Value").unwrap();

        let mut put = DispParams::from_caller_order(&[Variant::I4(9)]);
        put.named_args.push(DISPID_PROPERTYPUT);
        object.invoke(id, InvokeFlags::PROPERTYPUT, &mut put).unwrap();

        let mut get = DispParams::default();
        let value = object.invoke(id, InvokeFlags::PROPERTYGET, &mut get).unwrap();
        assert!(matches!(value, Variant::I4(9)));
    }

    #[test]
    fn test_kind_mismatch_reports_member_not_found() {
        let object = ExpandoObject::new("Cell")
            .with_property("Value", 1)
            .with_method("Clear", Some(0), |_| Ok(Variant::Empty));
        let value = lookup(&object, "Value").unwrap();
        let clear = lookup(&object, "Clear").unwrap();
        let mut params = DispParams::default();

        let err = object.invoke(value, InvokeFlags::METHOD, &mut params).unwrap_err();
        assert_eq!(err.hresult, HResult::DISP_E_MEMBERNOTFOUND);
        let err = object.invoke(clear, InvokeFlags::PROPERTYGET, &mut params).unwrap_err();
        assert_eq!(err.hresult, HResult::DISP_E_MEMBERNOTFOUND);
    }

    #[test]
    fn test_method_arity() {
        let object = ExpandoObject::new("Math").with_method("Neg", Some(1), |args| {
            Ok(Variant::I4(-args[0].to_i32().map_err(|_| HResult::DISP_E_TYPEMISMATCH)?))
        });
        let id = lookup(&object, "Neg").unwrap();
        let mut none = DispParams::default();
        let err = object.invoke(id, InvokeFlags::METHOD, &mut none).unwrap_err();
        assert_eq!(err.hresult, HResult::DISP_E_BADPARAMCOUNT);

        let mut one = DispParams::from_caller_order(&[Variant::I4(4)]);
        let value = object.invoke(id, InvokeFlags::METHOD, &mut one).unwrap();
        assert!(matches!(value, Variant::I4(-4)));
    }

    #[test]
    fn test_refcount_through_dispatch_ref() {
        let object = Arc::new(ExpandoObject::new("Counted"));
        let handle = Arc::clone(&object).into_dispatch();
        assert_eq!(object.ref_count(), 1);
        let copy = handle.clone();
        assert_eq!(object.ref_count(), 2);
        drop(copy);
        drop(handle);
        assert_eq!(object.ref_count(), 0);
    }
}
