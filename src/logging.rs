//! Logging setup
//!
//! The library only emits `tracing` events; nothing is printed until the
//! embedding application installs a subscriber. [`init_logging`] installs
//! one from a [`LogConfig`]. Targets used by the crate: `codec`, `variant`,
//! `array`, `invoke` and `bridge`.

use crate::config::LoggingConfig;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One line per event
    Compact,
    /// Structured JSON
    Json,
}

impl LogFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file
    File { directory: String, prefix: String },
}

impl LogOutput {
    /// File output for a path such as `logs/dispbridge.log`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dispbridge.log".to_string());
        LogOutput::File { directory, prefix }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives, e.g. "invoke=trace,array=debug"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Build from the `[logging]` config section. Unrecognized values keep
    /// their defaults.
    pub fn from_section(section: &LoggingConfig) -> Self {
        let mut config = Self::default();
        if let Some(level) = parse_level(&section.level) {
            config.level = level;
        }
        if let Some(format) = LogFormat::parse(&section.format) {
            config.format = format;
        }
        if let Some(file) = &section.file {
            config.output = LogOutput::file(file);
        }
        config
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DISPBRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("DISPBRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // DISPBRIDGE_LOG_FORMAT: pretty, compact, json
        if let Ok(format) = std::env::var("DISPBRIDGE_LOG_FORMAT") {
            config.format = LogFormat::parse(&format).unwrap_or(LogFormat::Compact);
        }

        // DISPBRIDGE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("DISPBRIDGE_LOG_FILE") {
            config.output = LogOutput::file(path);
        }

        config.span_events = std::env::var("DISPBRIDGE_LOG_SPANS").is_ok();
        config
    }
}

fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
///
/// Only the first call installs anything; later calls return `None`. The
/// returned guard flushes buffered output when dropped, so keep it alive
/// for the life of the program.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    if LOGGER_INITIALIZED.set(()).is_err() {
        return None;
    }

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    let filter = build_filter(&config);
    let spans = span_events_config(config.span_events);
    let base = fmt::layer().with_writer(writer).with_target(true);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => base.pretty().with_span_events(spans).with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_span_events(spans).with_filter(filter).boxed(),
        LogFormat::Json => base.json().with_span_events(spans).with_filter(filter).boxed(),
    };

    // Another subscriber may already be installed by the application
    tracing_subscriber::registry().with(layer).try_init().ok()?;
    Some(guard)
}

/// Initialize from `DISPBRIDGE_LOG_*` environment variables.
pub fn init_from_env() -> Option<WorkerGuard> {
    init_logging(LogConfig::from_env())
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(directives) => directives.split(',').fold(base_filter, |filter, directive| {
            match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    tracing::warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}
