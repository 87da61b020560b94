//! Configuration loading and typed config structures.
//!
//! Configuration lives in a YAML file (`statebridge.yaml` by convention).
//! Every field has a default, so an empty document is a valid config.
//! Environment variables override selected values after parsing.

use std::path::Path;

use serde::Deserialize;

/// Module identifier used when none is configured.
pub const DEFAULT_MODULE_IDENTIFIER: &str = "state_container_web.wasm";

/// Overrides `module.identifier`.
pub const MODULE_ENV_VAR: &str = "STATEBRIDGE_MODULE";

/// Overrides `logging.level`.
pub const LOG_LEVEL_ENV_VAR: &str = "STATEBRIDGE_LOG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// External module settings.
    #[serde(default)]
    pub module: ModuleConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings for the command-line harness.
    #[serde(default)]
    pub harness: HarnessConfig,
}

impl BridgeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `STATEBRIDGE_MODULE` overrides `module.identifier`
    /// - `STATEBRIDGE_LOG` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides looked up by environment variable name.
    ///
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(identifier) = present(MODULE_ENV_VAR) {
            self.module.identifier = identifier;
        }
        if let Some(level) = present(LOG_LEVEL_ENV_VAR) {
            self.logging.level = level;
        }
    }
}

/// External module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleConfig {
    /// Identifier handed to the module initializer.
    #[serde(default = "default_module_identifier")]
    pub identifier: String,

    /// Upper bound on initialization time in milliseconds (0 = unlimited).
    #[serde(default)]
    pub init_timeout_ms: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            identifier: default_module_identifier(),
            init_timeout_ms: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Command-line harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
    /// Event names the harness subscribes a logging listener to.
    #[serde(default = "default_subscribe")]
    pub subscribe: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            subscribe: default_subscribe(),
        }
    }
}

fn default_module_identifier() -> String {
    String::from(DEFAULT_MODULE_IDENTIFIER)
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_subscribe() -> Vec<String> {
    vec![String::from(crate::stub::NEW_STATE_EVENT)]
}
