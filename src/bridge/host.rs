//! Host value model
//!
//! [`HostValue`] is the dynamically-typed value the embedding runtime works
//! with. [`HostContext`] is the set of host services the bridge calls back
//! into: wrapping foreign objects, building error values, and local time.

use super::calendar::{Calendar, LocalCalendar};
use super::objects::{DispatchObject, VariantObject};
use crate::errors::Result;
use crate::variant::{DispatchRef, HResult, Variant};
use chrono::Local;
use std::fmt;
use std::sync::Arc;

pub type HostObjectRef = Arc<dyn HostObject>;

/// Dynamically-typed host value.
#[derive(Clone)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    String(String),
    Array(Vec<HostValue>),
    Error(HostError),
    Object(HostObjectRef),
    Function(String),
    External,
}

impl HostValue {
    /// Classify a number the way the host does: integral values that fit
    /// a signed 32-bit integer first, then unsigned, then double.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && !(value == 0.0 && value.is_sign_negative()) {
            if value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
                return HostValue::Int32(value as i32);
            }
            if value >= 0.0 && value <= f64::from(u32::MAX) {
                return HostValue::Uint32(value as u32);
            }
        }
        HostValue::Number(value)
    }

    pub fn string(text: impl Into<String>) -> Self {
        HostValue::String(text.into())
    }

    pub fn object(object: impl HostObject + 'static) -> Self {
        HostValue::Object(Arc::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            HostValue::Int32(n) => Some(f64::from(n)),
            HostValue::Uint32(n) => Some(f64::from(n)),
            HostValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Int32(_) | HostValue::Uint32(_) | HostValue::Number(_) => "number",
            HostValue::Date(_) => "date",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Error(_) => "error",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
            HostValue::External => "external",
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Undefined, Undefined) | (Null, Null) | (External, External) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Uint32(a), Uint32(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Error(a), Error(b)) => a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            (Function(a), Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("Undefined"),
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int32(n) => write!(f, "Int32({})", n),
            HostValue::Uint32(n) => write!(f, "Uint32({})", n),
            HostValue::Number(n) => write!(f, "Number({})", n),
            HostValue::Date(ms) => write!(f, "Date({})", ms),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HostValue::Error(err) => write!(f, "Error({:?})", err),
            HostValue::Object(obj) => write!(f, "Object({:?})", obj),
            HostValue::Function(name) => write!(f, "Function({})", name),
            HostValue::External => f.write_str("External"),
        }
    }
}

/// Host rendering of a value as text. Dates render as epoch milliseconds;
/// the bridge renders them in local time.
impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int32(n) => write!(f, "{}", n),
            HostValue::Uint32(n) => write!(f, "{}", n),
            HostValue::Number(n) | HostValue::Date(n) => write_number(f, *n),
            HostValue::String(s) => f.write_str(s),
            HostValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            HostValue::Error(err) => write!(f, "Error: {}", err.message),
            HostValue::Object(obj) => match obj.display_string() {
                Some(text) => f.write_str(&text),
                None => write!(f, "[object {}]", obj.class_name()),
            },
            HostValue::Function(name) => write!(f, "function {}() {{ [native code] }}", name),
            HostValue::External => f.write_str("[external]"),
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{}", n)
    }
}

/// Structured host error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub code: u32,
    pub message: String,
    pub source: Option<String>,
    pub help_file: Option<String>,
    pub help_context: Option<u32>,
}

impl HostError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            help_file: None,
            help_context: None,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.message, self.code)
    }
}

impl std::error::Error for HostError {}

/// Optional attribute attached to a [`HostError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAttribute {
    Source(String),
    HelpFile(String),
    HelpContext(u32),
}

/// Foreign value recovered from a host wrapper.
#[derive(Debug)]
pub enum Unwrapped {
    Variant(Variant),
    Dispatch(DispatchRef),
    /// The object does not wrap a foreign value.
    NotForeign,
}

/// Host object as the bridge sees it.
pub trait HostObject: Send + Sync + fmt::Debug {
    fn class_name(&self) -> &str {
        "Object"
    }

    /// Foreign value this object wraps. Fails if the wrapper has lost its
    /// payload, e.g. after finalization.
    fn unwrap_foreign(&self) -> Result<Unwrapped> {
        Ok(Unwrapped::NotForeign)
    }

    /// Value the object resolves to when used as a plain value (the host's
    /// `valueOf`), if it has one.
    fn resolve_value(&self) -> Option<HostValue> {
        None
    }

    /// Host text rendering; `None` if rendering fails.
    fn display_string(&self) -> Option<String> {
        Some(format!("[object {}]", self.class_name()))
    }
}

/// Host services the bridge depends on.
pub trait HostContext {
    /// Wrap a dispatch reference in a host object.
    fn wrap_dispatch(&self, object: DispatchRef) -> Result<HostValue>;

    /// Wrap a foreign value with no direct host form.
    fn wrap_variant(&self, value: Variant) -> Result<HostValue>;

    fn build_error(&self, code: HResult, description: &str) -> HostError;

    fn attach_error_attribute(&self, err: &mut HostError, attribute: ErrorAttribute) {
        match attribute {
            ErrorAttribute::Source(source) => err.source = Some(source),
            ErrorAttribute::HelpFile(file) => err.help_file = Some(file),
            ErrorAttribute::HelpContext(context) => err.help_context = Some(context),
        }
    }

    fn calendar(&self) -> &dyn Calendar;
}

/// Stock host: wraps foreign values in [`DispatchObject`] and
/// [`VariantObject`].
#[derive(Debug, Clone)]
pub struct DefaultHost<K: Calendar = LocalCalendar<Local>> {
    calendar: K,
}

impl DefaultHost {
    pub fn new() -> Self {
        Self {
            calendar: LocalCalendar::system(),
        }
    }
}

impl Default for DefaultHost {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Calendar> DefaultHost<K> {
    pub fn with_calendar(calendar: K) -> Self {
        Self { calendar }
    }
}

impl<K: Calendar> HostContext for DefaultHost<K> {
    fn wrap_dispatch(&self, object: DispatchRef) -> Result<HostValue> {
        Ok(HostValue::object(DispatchObject::new(object)))
    }

    fn wrap_variant(&self, value: Variant) -> Result<HostValue> {
        Ok(HostValue::object(VariantObject::new(value)))
    }

    fn build_error(&self, code: HResult, description: &str) -> HostError {
        HostError::new(code.code(), description)
    }

    fn calendar(&self) -> &dyn Calendar {
        &self.calendar
    }
}
