//! Error types for the statebridge harness binary.
//!
//! [`CliError`] wraps every failure mode between startup and the final
//! state dump so `main` can propagate with `?`.

/// Top-level error for the harness binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: statebridge_core::config::ConfigError,
    },

    /// The module could not be loaded.
    #[error("load error: {source}")]
    Load {
        /// The underlying load error.
        #[from]
        source: statebridge_core::LoadError,
    },

    /// Reading the action script failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A script line was not a valid action request.
    #[error("script line {line}: {source}")]
    Script {
        /// One-based line number.
        line: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The final state could not be rendered.
    #[error("serde error: {source}")]
    Serde {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
