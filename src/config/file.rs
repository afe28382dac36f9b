//! TOML configuration file loading.
//!
//! Layout:
//!
//! ```toml
//! [settings]
//! timeout_secs = 30
//! bandwidth_kb_per_sec = 512
//!
//! [[blogs]]
//! name = "example"
//! tags = "art, sketch"
//! skip_gif = true
//!
//! [blogs.hosts]
//! platform = "any"
//! webmshare = "mp4"
//! ```

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{AppSettings, BlogSettings, ConfigError};

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub settings: AppSettings,
    /// Configured blogs.
    #[serde(default)]
    pub blogs: Vec<BlogSettings>,
}

impl FileConfig {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and the validation error of
    /// the first invalid setting otherwise.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates settings and every blog entry.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        let mut seen = HashSet::new();
        for blog in &self.blogs {
            blog.validate()?;
            if !seen.insert(blog.name.to_lowercase()) {
                return Err(ConfigError::DuplicateBlog {
                    name: blog.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/blogfetch/config.toml`
/// 2. `$HOME/.config/blogfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("blogfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("blogfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads configuration from `path`, or from the default path when `None`.
///
/// A missing default file yields the built-in defaults; an explicitly named file
/// must exist.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match resolve_default_config_path() {
            Some(path) => (path, false),
            None => return Ok(FileConfig::default()),
        },
    };

    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(FileConfig::default());
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = FileConfig::from_toml_str(&raw, &path)?;
    debug!(path = %path.display(), blogs = config.blogs.len(), "config loaded");
    Ok(config)
}
