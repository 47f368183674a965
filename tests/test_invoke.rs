use dispbridge::invoke::{self, AutoType};
use dispbridge::variant::dispatch::DISPID_PROPERTYPUT;
use dispbridge::variant::{
    slot, ByRef, DispId, DispParams, Dispatch, DispatchFailure, ExcepInfo, InvokeFlags, Pointer,
};
use dispbridge::{BStr, BridgeError, DispatchRef, ExpandoObject, HResult, Variant};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn calculator() -> Arc<ExpandoObject> {
    Arc::new(
        ExpandoObject::new("Calculator")
            .recording()
            .with_method("Sub", Some(2), |args| {
                Ok(Variant::I4(args[0].to_i32().unwrap() - args[1].to_i32().unwrap()))
            })
            .with_property("Count", 3)
            .with_property("Caption", "calc"),
    )
}

#[test]
fn test_arguments_arrive_in_reverse_order() {
    let object = calculator();
    let target = Arc::clone(&object).into_dispatch();

    let result = invoke::invoke(&target, "Sub", &[Variant::I4(10), Variant::I4(4)], true).unwrap();
    assert!(matches!(result, Variant::I4(6)));

    let calls = object.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].flags, InvokeFlags::METHOD);
    assert!(matches!(calls[0].raw_args[..], [Variant::I4(4), Variant::I4(10)]));
}

#[test]
fn test_method_call_retries_as_property() {
    let object = calculator();
    let target = Arc::clone(&object).into_dispatch();

    let result = invoke::invoke(&target, "Count", &[], true).unwrap();
    assert!(matches!(result, Variant::I4(3)));

    let flags: Vec<_> = object.calls().iter().map(|c| c.flags).collect();
    assert_eq!(flags, vec![InvokeFlags::METHOD, InvokeFlags::PROPERTYGET]);
}

#[test]
fn test_retry_disabled() {
    let target = calculator().into_dispatch();
    let err = invoke::invoke(&target, "Count", &[], false).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::MemberNotFound { hresult, .. } if hresult == HResult::DISP_E_MEMBERNOTFOUND
    ));
}

#[test]
fn test_unknown_name_is_not_retried() {
    let object = calculator();
    let target = Arc::clone(&object).into_dispatch();

    let err = invoke::invoke(&target, "Missing", &[], true).unwrap_err();
    match err {
        BridgeError::MemberNotFound { member, hresult } => {
            assert_eq!(member, "Missing");
            assert_eq!(hresult, HResult::DISP_E_UNKNOWNNAME);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(object.calls().is_empty());
}

/// Resolves every name but rejects every invocation.
struct Stubborn {
    invocations: AtomicU32,
}

impl Dispatch for Stubborn {
    fn add_ref(&self) -> u32 {
        2
    }

    fn release(&self) -> u32 {
        1
    }

    fn get_ids_of_names(&self, _name: &BStr) -> Result<DispId, HResult> {
        Ok(7)
    }

    fn invoke(
        &self,
        _id: DispId,
        _flags: InvokeFlags,
        _params: &mut DispParams,
    ) -> Result<Variant, DispatchFailure> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(HResult::DISP_E_MEMBERNOTFOUND.into())
    }
}

#[test]
fn test_retry_happens_exactly_once() {
    let object = Arc::new(Stubborn {
        invocations: AtomicU32::new(0),
    });
    let target = DispatchRef::adopt(object.clone());

    assert!(invoke::invoke(&target, "Anything", &[], true).is_err());
    assert_eq!(object.invocations.load(Ordering::SeqCst), 2);
}

#[test]
fn test_put_prop_passes_value_as_named_argument() {
    let object = calculator();
    let target = Arc::clone(&object).into_dispatch();

    let result = invoke::put_prop(&target, "Caption", &[Variant::string("sums")]).unwrap();
    assert!(result.is_empty());
    assert_eq!(
        object.property("caption").unwrap().to_utf8().unwrap().as_deref(),
        Some("sums")
    );

    let calls = object.calls();
    let put = &calls[0];
    assert_eq!(put.flags, InvokeFlags::PROPERTYPUT);
    assert_eq!(put.named_args, vec![DISPID_PROPERTYPUT]);
}

#[test]
fn test_put_prop_requires_a_value() {
    let target = calculator().into_dispatch();
    let err = invoke::put_prop(&target, "Caption", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentCountMismatch { supplied: 0, .. }));
}

#[test]
fn test_get_prop_on_variant() {
    let holder = Variant::dispatch(calculator().into_dispatch());
    let caption = holder.get_prop("Caption", &[]).unwrap();
    assert_eq!(caption.to_utf8().unwrap().as_deref(), Some("calc"));

    let err = Variant::I4(1).get_prop("Caption", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { expected: "VT_DISPATCH", .. }));
}

#[test]
fn test_wrong_argument_count() {
    let target = calculator().into_dispatch();
    let err = invoke::invoke(&target, "Sub", &[Variant::I4(1)], true).unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentCountMismatch { supplied: 1, .. }));
}

#[test]
fn test_type_mismatch_reports_caller_position() {
    let object = ExpandoObject::new("Strict").with_method("Pair", Some(2), |args| {
        match args[1] {
            Variant::BStr(_) => Ok(Variant::Empty),
            // Last caller argument is first in the reverse-order block
            _ => Err(DispatchFailure::new(HResult::DISP_E_TYPEMISMATCH).with_arg_err(0)),
        }
    });
    let target = Arc::new(object).into_dispatch();

    let err = invoke::invoke(&target, "Pair", &[Variant::I4(1), Variant::I4(2)], true).unwrap_err();
    match err {
        BridgeError::ArgumentTypeMismatch { member, position } => {
            assert_eq!(member, "Pair");
            assert_eq!(position, Some(1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_exception_detail() {
    let object = ExpandoObject::new("Busy").with_method("Recalc", Some(0), |_| {
        Err(DispatchFailure::exception(ExcepInfo {
            description: Some(BStr::from("Busy")),
            source: Some(BStr::from("Calc")),
            scode: 5,
            ..ExcepInfo::default()
        }))
    });
    let target = Arc::new(object).into_dispatch();

    let err = invoke::auto_wrap(&target, AutoType::Method, "Recalc", &[]).unwrap_err();
    let detail = err.detail().expect("foreign failure carries detail");
    assert_eq!(detail.code().code(), 0x8007_0005);
    assert_eq!(detail.description(), "Busy");
    assert_eq!(detail.source(), Some("Calc"));
    assert_eq!(detail.help_file(), None);
    assert_eq!(detail.help_context(), None);
    assert_eq!(err.hresult(), HResult::E_ACCESSDENIED);
}

#[test]
fn test_out_parameter_through_byref() {
    let object = ExpandoObject::new("Out").with_method("Fill", Some(1), |args| match &args[0] {
        Variant::ByRef(ByRef::I4(ptr)) => {
            ptr.store(99);
            Ok(Variant::Empty)
        }
        _ => Err(HResult::DISP_E_TYPEMISMATCH.into()),
    });
    let target = Arc::new(object).into_dispatch();

    let storage = slot(0i32);
    let out = Variant::ByRef(ByRef::I4(Pointer::to(&storage)));
    invoke::invoke(&target, "Fill", &[out], true).unwrap();
    assert_eq!(*storage.read(), 99);
}

#[test]
fn test_indexed_property() {
    let cells = Arc::new(parking_lot::Mutex::new(vec![Variant::Empty; 4]));
    let reader = Arc::clone(&cells);
    let writer = Arc::clone(&cells);
    let object = ExpandoObject::new("Range").with_indexed_mut(
        "Item",
        move |idx| {
            let i = idx[0].to_i32().map_err(|_| HResult::DISP_E_TYPEMISMATCH)? as usize;
            reader.lock().get(i).cloned().ok_or(HResult::DISP_E_BADINDEX.into())
        },
        move |idx, value| {
            let i = idx[0].to_i32().map_err(|_| HResult::DISP_E_TYPEMISMATCH)? as usize;
            let mut cells = writer.lock();
            let cell = cells.get_mut(i).ok_or(HResult::DISP_E_BADINDEX)?;
            *cell = value;
            Ok(())
        },
    );
    let target = Arc::new(object).into_dispatch();

    invoke::put_prop(&target, "Item", &[Variant::I4(2), Variant::string("x")]).unwrap();
    let value = invoke::get_prop(&target, "Item", &[Variant::I4(2)]).unwrap();
    assert_eq!(value.to_utf8().unwrap().as_deref(), Some("x"));

    let err = invoke::get_prop(&target, "Item", &[Variant::I4(9)]).unwrap_err();
    assert_eq!(err.hresult(), HResult::DISP_E_BADINDEX);
}

#[test]
fn test_arguments_released_after_call() {
    let passenger = Arc::new(ExpandoObject::new("Passenger"));
    let handle = Arc::clone(&passenger).into_dispatch();
    let holder = ExpandoObject::new("Holder").with_property("Caption", "calc");
    let target = Arc::new(holder).into_dispatch();

    let _ = invoke::put_prop(&target, "Caption", &[Variant::dispatch(handle.clone())]);
    // The stored property keeps one reference; our handle keeps the other
    assert_eq!(passenger.ref_count(), 2);
    invoke::put_prop(&target, "Caption", &[Variant::I4(0)]).unwrap();
    assert_eq!(passenger.ref_count(), 1);
    drop(handle);
    assert_eq!(passenger.ref_count(), 0);
}
