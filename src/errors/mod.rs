//! Bridge error types
//!
//! [`BridgeError`] is the one failure type every fallible operation returns.
//! Failures raised by a foreign member carry an [`ErrorDetail`] built from
//! the callee's exception record; [`ErrorDetail::to_host_error`] turns that
//! into the host's structured error value.

use crate::bridge::{ErrorAttribute, HostContext, HostError};
use crate::codec::{BStr, EncodingError};
use crate::variant::{ArrayError, ExcepInfo, HResult};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures surfaced by the codec, invoker and value bridge.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("{0}")]
    UnsupportedValueKind(String),

    #[error("member '{member}' not found: {}", .hresult.message())]
    MemberNotFound { member: String, hresult: HResult },

    #[error("type mismatch in argument {} of '{member}'", describe_position(.position))]
    ArgumentTypeMismatch {
        member: String,
        /// Caller-order position of the offending argument.
        position: Option<usize>,
    },

    #[error("wrong number of arguments ({supplied}) for '{member}'")]
    ArgumentCountMismatch { member: String, supplied: usize },

    #[error("{0}")]
    InvocationFailed(Box<ErrorDetail>),

    #[error("undefined result: {0}")]
    UndefinedResult(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
}

fn describe_position(position: &Option<usize>) -> String {
    match position {
        Some(index) => index.to_string(),
        None => "?".to_string(),
    }
}

impl From<ArrayError> for BridgeError {
    fn from(err: ArrayError) -> Self {
        BridgeError::UndefinedResult(err.to_string())
    }
}

impl From<ErrorDetail> for BridgeError {
    fn from(detail: ErrorDetail) -> Self {
        BridgeError::InvocationFailed(Box::new(detail))
    }
}

impl BridgeError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        BridgeError::UnsupportedValueKind(message.into())
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        BridgeError::UndefinedResult(message.into())
    }

    /// Status code reported to the host for this failure.
    pub fn hresult(&self) -> HResult {
        match self {
            BridgeError::Encoding(_) => HResult::E_INVALIDARG,
            BridgeError::UnsupportedValueKind(_) => HResult::DISP_E_BADVARTYPE,
            BridgeError::MemberNotFound { hresult, .. } => *hresult,
            BridgeError::ArgumentTypeMismatch { .. } | BridgeError::TypeMismatch { .. } => {
                HResult::DISP_E_TYPEMISMATCH
            }
            BridgeError::ArgumentCountMismatch { .. } => HResult::DISP_E_BADPARAMCOUNT,
            BridgeError::InvocationFailed(detail) => detail.code(),
            BridgeError::UndefinedResult(_) => HResult::E_UNEXPECTED,
        }
    }

    /// The detail of a foreign-raised failure.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            BridgeError::InvocationFailed(detail) => Some(detail),
            _ => None,
        }
    }

    /// Host error value for this failure.
    pub fn to_host_error<C: HostContext + ?Sized>(&self, ctx: &C) -> HostError {
        match self {
            BridgeError::InvocationFailed(detail) => detail.to_host_error(ctx),
            other => ctx.build_error(other.hresult(), &other.to_string()),
        }
    }
}

/// Immutable description of a foreign-raised failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    code: HResult,
    description: String,
    source: Option<String>,
    help_file: Option<String>,
    help_context: Option<u32>,
}

impl ErrorDetail {
    /// Detail for a bare status code, described by the system text.
    pub fn from_hresult(code: HResult) -> Self {
        Self {
            code,
            description: code.message(),
            source: None,
            help_file: None,
            help_context: None,
        }
    }

    /// Detail from the exception record a foreign member filled in.
    ///
    /// The record's own description wins over the system text for `hr`. A
    /// non-zero `scode` replaces the numeric code, lifted into the status
    /// space; otherwise a non-zero application `code` does.
    pub fn from_excep_info(hr: HResult, info: &ExcepInfo) -> Self {
        let description = non_empty(info.description.as_ref()).unwrap_or_else(|| hr.message());
        let code = if info.scode != 0 {
            HResult::from_win32(info.scode)
        } else if info.code != 0 {
            HResult(i32::from(info.code))
        } else {
            hr
        };
        Self {
            code,
            description,
            source: non_empty(info.source.as_ref()),
            help_file: non_empty(info.help_file.as_ref()),
            help_context: (info.help_context != 0).then_some(info.help_context),
        }
    }

    pub fn code(&self) -> HResult {
        self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn help_file(&self) -> Option<&str> {
        self.help_file.as_deref()
    }

    pub fn help_context(&self) -> Option<u32> {
        self.help_context
    }

    /// Build the host error, attaching only the attributes present.
    pub fn to_host_error<C: HostContext + ?Sized>(&self, ctx: &C) -> HostError {
        let mut err = ctx.build_error(self.code, &self.description);
        if let Some(source) = &self.source {
            ctx.attach_error_attribute(&mut err, ErrorAttribute::Source(source.clone()));
        }
        if let Some(help_file) = &self.help_file {
            ctx.attach_error_attribute(&mut err, ErrorAttribute::HelpFile(help_file.clone()));
        }
        if let Some(help_context) = self.help_context {
            ctx.attach_error_attribute(&mut err, ErrorAttribute::HelpContext(help_context));
        }
        err
    }
}

fn non_empty(text: Option<&BStr>) -> Option<String> {
    text.filter(|s| !s.is_empty()).map(BStr::to_string_lossy)
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.code)?;
        if let Some(source) = &self.source {
            write!(f, " [{}]", source)?;
        }
        Ok(())
    }
}
