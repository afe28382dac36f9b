//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Every variant is fatal for the component being configured; nothing here is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is outside its accepted range or otherwise unusable.
    #[error("invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A variant selector string is not one of the known selectors.
    #[error("unknown media variant '{value}'")]
    UnknownVariant {
        /// The rejected selector.
        value: String,
    },

    /// An image size preference string is not one of the known sizes.
    #[error("unknown image size '{value}' (expected raw, 1280, 540, 500, 400, 250, 100 or 75sq)")]
    UnknownImageSize {
        /// The rejected size.
        value: String,
    },

    /// A blog with this name is configured more than once.
    #[error("blog '{name}' is configured more than once")]
    DuplicateBlog {
        /// The repeated blog name.
        name: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected layout.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the malformed file.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
