use crate::bridge::DEFAULT_MAX_DEPTH;
use crate::codec::{self, Codec, Codepage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`Config::discover`].
pub const CONFIG_FILE: &str = ".dispbridge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("substitution '{0}' is not a single ASCII character")]
    InvalidSubstitution(char),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub invoke: InvokeConfig,

    #[serde(default)]
    pub marshal: MarshalConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Narrow codepage for legacy byte strings
    #[serde(default)]
    pub codepage: Codepage,

    /// Replacement for characters the codepage cannot encode
    #[serde(default = "default_substitution")]
    pub substitution: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeConfig {
    #[serde(default = "default_true")]
    pub retry_as_property: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarshalConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// pretty, compact or json
    #[serde(default = "default_format")]
    pub format: String,

    /// Rolling log file path; stderr when unset
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codepage: Codepage::default(),
            substitution: default_substitution(),
        }
    }
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            retry_as_property: true,
        }
    }
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_substitution() -> char { '?' }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }
fn default_level() -> String { "info".to_string() }
fn default_format() -> String { "compact".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load configuration from the current directory or its parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return config;
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        r#"# dispbridge configuration

[codec]
# Narrow codepage for legacy byte strings: utf-8, windows-1252, latin1, ascii
codepage = "windows-1252"
substitution = "?"

[invoke]
# Read a member as a property when it is called but is not a method
retry_as_property = true

[marshal]
# Nesting limit for by-reference and variant-array conversion
max_depth = 64

[logging]
level = "info"
format = "compact"
# file = "logs/dispbridge.log"
"#
        .to_string()
    }

    /// Codec settings described by the `[codec]` section.
    pub fn codec(&self) -> Result<Codec, ConfigError> {
        let substitution = self.codec.substitution;
        if !substitution.is_ascii() {
            return Err(ConfigError::InvalidSubstitution(substitution));
        }
        Ok(Codec::new(self.codec.codepage).with_substitution(substitution as u8))
    }

    /// Make the `[codec]` section the process-wide codec.
    pub fn apply(&self) -> Result<(), ConfigError> {
        codec::set_active(self.codec()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.invoke.retry_as_property);
        assert_eq!(config.marshal.max_depth, 64);
        assert_eq!(config.codec.codepage, Codepage::Windows1252);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [codec]
            codepage = "utf-8"

            [invoke]
            retry_as_property = false
        "#;

        let config = Config::parse(toml).unwrap();
        assert!(!config.invoke.retry_as_property);
        assert_eq!(config.codec().unwrap().codepage, Codepage::Utf8);
        assert_eq!(config.marshal.max_depth, 64);
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_generated_default_parses() {
        let config = Config::parse(&Config::generate_default()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_codepage() {
        let err = Config::parse("[codec]\ncodepage = \"klingon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let config = Config::parse("[codec]\ncodepage = \"iso-8859-1\"").unwrap();
        assert_eq!(config.codec.codepage, Codepage::Latin1);
    }

    #[test]
    fn test_non_ascii_substitution() {
        let config = Config::parse("[codec]\nsubstitution = \"€\"").unwrap();
        assert!(matches!(config.codec(), Err(ConfigError::InvalidSubstitution('€'))));
        assert!(matches!(config.apply(), Err(ConfigError::InvalidSubstitution(_))));

        let config = Config::parse("[codec]\nsubstitution = \"_\"").unwrap();
        assert_eq!(config.codec().unwrap().substitution, b'_');
    }

    #[test]
    fn test_save_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let mut config = Config::default();
        config.marshal.max_depth = 8;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let found = Config::discover_from(&nested);
        assert_eq!(found.marshal.max_depth, 8);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/.dispbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
