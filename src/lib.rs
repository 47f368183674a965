//! Value marshaling between a dynamic host runtime and late-bound foreign
//! component objects.
//!
//! - [`codec`]: UTF-8, wide and narrow-codepage string conversion
//! - [`variant`]: the tagged [`Variant`] value, arrays, dates and the
//!   [`Dispatch`] protocol
//! - [`invoke`]: name-based property and method invocation
//! - [`bridge`]: host value <-> variant conversion through a [`HostContext`]
//! - [`expando`]: in-process dispatch objects

// Core modules
pub mod codec;
pub mod errors;
pub mod invoke;
pub mod variant;

// Host side
pub mod bridge;
pub mod expando;

// Ambient
pub mod config;
pub mod logging;

// Re-export commonly used items
pub use bridge::{Bridge, DefaultHost, HostContext, HostError, HostObject, HostValue, MarshalOptions};
pub use codec::{BStr, Codec, Codepage, EncodingError};
pub use config::{Config, ConfigError};
pub use errors::{BridgeError, ErrorDetail, Result};
pub use expando::ExpandoObject;
pub use invoke::AutoType;
pub use logging::{init_logging, LogConfig, LogFormat, LogOutput};
pub use variant::{
    ArrayBound, ArrayData, ByRef, Dispatch, DispatchRef, HResult, OleDate, SafeArray, VarType,
    Variant,
};
