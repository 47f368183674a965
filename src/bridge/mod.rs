//! Value bridge between host values and foreign variants
//!
//! Conversion in both directions is driven by a [`HostContext`], which
//! supplies the host-side services (object wrapping, error values, local
//! time). [`Bridge`] pairs a context with marshaling options and exposes
//! the property and method calls a host makes on foreign objects.

pub mod calendar;
pub mod host;
pub mod objects;

mod array;
mod to_foreign;
mod to_host;

pub use calendar::{Calendar, LocalCalendar};
pub use host::{
    DefaultHost, ErrorAttribute, HostContext, HostError, HostObject, HostObjectRef, HostValue,
    Unwrapped,
};
pub use objects::{DispatchObject, VariantObject};

use crate::config::Config;
use crate::errors::{BridgeError, Result};
use crate::invoke;
use crate::variant::{DispatchRef, Variant};
use smallvec::SmallVec;

/// Nesting limit for recursive conversions.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Knobs for conversion and invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalOptions {
    pub max_depth: usize,
    /// Retry a method call as a property read when the member is not a
    /// method.
    pub retry_as_property: bool,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            retry_as_property: true,
        }
    }
}

impl From<&Config> for MarshalOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_depth: config.marshal.max_depth,
            retry_as_property: config.invoke.retry_as_property,
        }
    }
}

/// One conversion pass: a context plus the depth limit.
pub(crate) struct Marshal<'a, C: HostContext + ?Sized> {
    ctx: &'a C,
    max_depth: usize,
}

impl<'a, C: HostContext + ?Sized> Marshal<'a, C> {
    pub(crate) fn new(ctx: &'a C, max_depth: usize) -> Self {
        Self { ctx, max_depth }
    }

    fn enter(&self, depth: usize) -> Result<usize> {
        if depth >= self.max_depth {
            return Err(BridgeError::undefined(format!(
                "maximum nesting depth ({}) exceeded",
                self.max_depth
            )));
        }
        Ok(depth + 1)
    }
}

/// Convert a host value into a foreign variant.
pub fn to_variant<C: HostContext + ?Sized>(ctx: &C, value: &HostValue) -> Result<Variant> {
    Marshal::new(ctx, DEFAULT_MAX_DEPTH).to_variant(value)
}

/// Convert a foreign variant into a host value.
pub fn to_host<C: HostContext + ?Sized>(ctx: &C, value: &Variant) -> Result<HostValue> {
    Marshal::new(ctx, DEFAULT_MAX_DEPTH).to_host(value, 0)
}

/// Host-facing entry point.
pub struct Bridge<C: HostContext = DefaultHost> {
    ctx: C,
    options: MarshalOptions,
}

impl Bridge {
    /// Bridge over [`DefaultHost`] in the local time zone.
    pub fn new() -> Self {
        Self::with_context(DefaultHost::new())
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HostContext> Bridge<C> {
    pub fn with_context(ctx: C) -> Self {
        Self {
            ctx,
            options: MarshalOptions::default(),
        }
    }

    pub fn with_options(ctx: C, options: MarshalOptions) -> Self {
        Self { ctx, options }
    }

    pub fn from_config(ctx: C, config: &Config) -> Self {
        Self::with_options(ctx, MarshalOptions::from(config))
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn options(&self) -> MarshalOptions {
        self.options
    }

    fn marshal(&self) -> Marshal<'_, C> {
        Marshal::new(&self.ctx, self.options.max_depth)
    }

    pub fn to_variant(&self, value: &HostValue) -> Result<Variant> {
        self.marshal().to_variant(value)
    }

    pub fn to_host(&self, value: &Variant) -> Result<HostValue> {
        self.marshal().to_host(value, 0)
    }

    /// Convert call arguments, failing on the first unsupported one.
    pub fn to_variants(&self, values: &[HostValue]) -> Result<SmallVec<[Variant; 4]>> {
        values.iter().map(|v| self.to_variant(v)).collect()
    }

    /// Dispatch reference behind a host value.
    pub fn dispatch_of(&self, value: &HostValue) -> Result<DispatchRef> {
        self.to_variant(value)?.as_dispatch()
    }

    pub fn get(&self, target: &DispatchRef, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let args = self.to_variants(args)?;
        let result = invoke::get_prop(target, name, &args)?;
        self.to_host(&result)
    }

    /// Property write; the last argument is the value. Yields undefined.
    pub fn put(&self, target: &DispatchRef, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let args = self.to_variants(args)?;
        invoke::put_prop(target, name, &args)?;
        Ok(HostValue::Undefined)
    }

    pub fn call(&self, target: &DispatchRef, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let args = self.to_variants(args)?;
        let result = invoke::invoke(target, name, &args, self.options.retry_as_property)?;
        self.to_host(&result)
    }

    /// Host text of a foreign value, dates in local time.
    pub fn display_string(&self, value: &Variant) -> Result<String> {
        let host = self.to_host(value)?;
        Ok(self.display_host(&host))
    }

    /// Text of a host value. Dates show the millisecond a conversion to
    /// the foreign side would store.
    pub fn display_host(&self, value: &HostValue) -> String {
        self.render(value, "%Y-%m-%d %H:%M:%S%.3f")
    }

    /// Like [`Bridge::display_string`] with the locale date layout.
    pub fn locale_string(&self, value: &Variant) -> Result<String> {
        let host = self.to_host(value)?;
        Ok(self.render(&host, "%c"))
    }

    fn render(&self, value: &HostValue, date_format: &str) -> String {
        match value {
            HostValue::Date(ms) => self
                .ctx
                .calendar()
                .to_local(ms.floor() as i64)
                .and_then(|fields| fields.to_naive())
                .map(|dt| dt.format(date_format).to_string())
                .unwrap_or_else(|| "Invalid Date".to_string()),
            other => other.to_string(),
        }
    }

    /// Host error value for a bridge failure.
    pub fn host_error(&self, err: &BridgeError) -> HostError {
        err.to_host_error(&self.ctx)
    }
}
