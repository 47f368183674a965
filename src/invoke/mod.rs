//! Dynamic invoker
//!
//! Resolves a member by name on a dispatch object, marshals the arguments
//! into the reverse-order block the protocol expects, invokes, and maps the
//! callee's status into a [`BridgeError`]. One call moves through
//! resolving, marshaling, dispatching and then succeeded or failed; each
//! transition is traced inside a `dispatch` span.

use crate::codec::BStr;
use crate::errors::{BridgeError, ErrorDetail, Result};
use crate::variant::dispatch::DISPID_PROPERTYPUT;
use crate::variant::{DispParams, DispatchFailure, DispatchRef, HResult, InvokeFlags, Variant};
use smallvec::smallvec;
use std::fmt;
use tracing::{debug, debug_span, trace};

/// How a member is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoType {
    PropertyGet,
    PropertyPut,
    Method,
}

impl AutoType {
    pub fn flags(self) -> InvokeFlags {
        match self {
            AutoType::PropertyGet => InvokeFlags::PROPERTYGET,
            AutoType::PropertyPut => InvokeFlags::PROPERTYPUT,
            AutoType::Method => InvokeFlags::METHOD,
        }
    }
}

impl fmt::Display for AutoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutoType::PropertyGet => "get",
            AutoType::PropertyPut => "put",
            AutoType::Method => "method",
        })
    }
}

/// Resolve `name` on `target` and invoke it with `args` in caller order.
///
/// For [`AutoType::PropertyPut`] the last argument is the value being
/// assigned and the result is empty.
pub fn auto_wrap(
    target: &DispatchRef,
    auto_type: AutoType,
    name: &str,
    args: &[Variant],
) -> Result<Variant> {
    let span = debug_span!(target: "invoke", "dispatch", member = name, kind = %auto_type);
    let _enter = span.enter();

    trace!(target: "invoke", event = "resolving", member = name);
    let wide = BStr::from(name);
    let id = target.get_ids_of_names(&wide).map_err(|hresult| {
        debug!(target: "invoke", event = "failed", stage = "resolve", %hresult);
        BridgeError::MemberNotFound {
            member: name.to_string(),
            hresult,
        }
    })?;

    trace!(target: "invoke", event = "marshaling", id, argc = args.len());
    let mut params = DispParams::from_caller_order(args);
    if auto_type == AutoType::PropertyPut {
        if args.is_empty() {
            return Err(BridgeError::ArgumentCountMismatch {
                member: name.to_string(),
                supplied: 0,
            });
        }
        params.named_args = smallvec![DISPID_PROPERTYPUT];
    }

    trace!(target: "invoke", event = "dispatching", id, flags = %auto_type.flags());
    let outcome = target.invoke(id, auto_type.flags(), &mut params);
    // Marshaled temporaries are released before the outcome is reported
    drop(params);

    match outcome {
        Ok(value) => {
            trace!(target: "invoke", event = "succeeded", vt = value.vt());
            Ok(if auto_type == AutoType::PropertyPut {
                Variant::Empty
            } else {
                value
            })
        }
        Err(failure) => {
            debug!(target: "invoke", event = "failed", stage = "invoke", hresult = %failure.hresult);
            Err(map_failure(name, args.len(), failure))
        }
    }
}

/// Read a property.
pub fn get_prop(target: &DispatchRef, name: &str, args: &[Variant]) -> Result<Variant> {
    auto_wrap(target, AutoType::PropertyGet, name, args)
}

/// Write a property; the last argument is the value.
pub fn put_prop(target: &DispatchRef, name: &str, args: &[Variant]) -> Result<Variant> {
    auto_wrap(target, AutoType::PropertyPut, name, args)
}

/// Call a method.
///
/// With `retry_as_property`, a member that resolves but is not a method is
/// read as a property instead, exactly once.
pub fn invoke(
    target: &DispatchRef,
    name: &str,
    args: &[Variant],
    retry_as_property: bool,
) -> Result<Variant> {
    match auto_wrap(target, AutoType::Method, name, args) {
        Err(err) if retry_as_property && is_not_a_method(&err) => {
            debug!(target: "invoke", event = "retry_as_property", member = name);
            auto_wrap(target, AutoType::PropertyGet, name, args)
        }
        outcome => outcome,
    }
}

/// The member resolved but rejected the invocation kind.
fn is_not_a_method(err: &BridgeError) -> bool {
    matches!(
        err,
        BridgeError::MemberNotFound { hresult, .. } if *hresult == HResult::DISP_E_MEMBERNOTFOUND
    )
}

fn map_failure(name: &str, argc: usize, failure: DispatchFailure) -> BridgeError {
    let member = name.to_string();
    match failure.hresult {
        HResult::DISP_E_MEMBERNOTFOUND | HResult::DISP_E_UNKNOWNNAME => BridgeError::MemberNotFound {
            member,
            hresult: failure.hresult,
        },
        HResult::DISP_E_TYPEMISMATCH | HResult::DISP_E_BADVARTYPE => {
            // The callee reports positions in reverse order
            let position = failure
                .arg_err
                .map(|idx| idx as usize)
                .filter(|&idx| idx < argc)
                .map(|idx| argc - 1 - idx);
            BridgeError::ArgumentTypeMismatch { member, position }
        }
        HResult::DISP_E_BADPARAMCOUNT | HResult::DISP_E_PARAMNOTOPTIONAL => {
            BridgeError::ArgumentCountMismatch {
                member,
                supplied: argc,
            }
        }
        hresult => {
            let detail = match &failure.excep_info {
                Some(info) => ErrorDetail::from_excep_info(hresult, info),
                None => ErrorDetail::from_hresult(hresult),
            };
            BridgeError::InvocationFailed(Box::new(detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::ExcepInfo;

    #[test]
    fn test_map_type_mismatch_position() {
        let failure = DispatchFailure::new(HResult::DISP_E_TYPEMISMATCH).with_arg_err(0);
        match map_failure("Add", 3, failure) {
            BridgeError::ArgumentTypeMismatch { position, .. } => assert_eq!(position, Some(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_map_exception_detail() {
        let failure = DispatchFailure::exception(ExcepInfo {
            description: Some(BStr::from("Busy")),
            scode: 5,
            ..ExcepInfo::default()
        });
        let err = map_failure("Run", 0, failure);
        let detail = err.detail().unwrap();
        assert_eq!(detail.code(), HResult::E_ACCESSDENIED);
        assert_eq!(detail.description(), "Busy");
    }

    #[test]
    fn test_map_bare_hresult() {
        let err = map_failure("Run", 0, HResult::E_FAIL.into());
        assert_eq!(err.detail().unwrap().description(), "Unspecified error");
        assert!(!is_not_a_method(&err));
    }
}
