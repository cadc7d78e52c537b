//! Service configuration loading.
//!
//! ## Responsibility
//! Resolve artifact paths and server binding from defaults, an optional TOML
//! file (`CONFIG_PATH`), and environment variable overrides, validating the
//! result before the service starts.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//! - Precedence: environment variables > TOML file > built-in defaults
//!
//! ## NOT Responsible For
//! - Loading the artifacts themselves (that belongs to `model`)
//! - Binding the server (that belongs to `web_api`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::web_api::ServerConfig;

// ── Default value functions ──────────────────────────────────────────────

/// Default artifact directory, matching the training pipeline's output.
fn default_model_dir() -> PathBuf {
    PathBuf::from("./model")
}

/// Default predictor artifact file name.
fn default_model_file() -> String {
    "best_model.json".to_string()
}

/// Default feature-schema descriptor file name.
fn default_feature_info_file() -> String {
    "feature_info.json".to_string()
}

/// Errors produced while loading service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {file}: {source}")]
    Io {
        /// Path of the unreadable file.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse config {file}: {source}")]
    Parse {
        /// Path of the malformed file.
        file: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A configuration value violates a semantic constraint.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Root configuration for the prediction service.
///
/// Every field has a documented default, so an empty TOML file (or no file
/// at all) yields a runnable configuration.
///
/// # Example
///
/// ```toml
/// model_dir = "/srv/models"
/// model_file = "best_model.json"
///
/// [server]
/// host = "127.0.0.1"
/// port = 9000
/// ```
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Directory holding the model artifact and schema descriptor.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Predictor artifact file name within `model_dir`.
    #[serde(default = "default_model_file")]
    pub model_file: String,
    /// Feature-schema descriptor file name within `model_dir`.
    #[serde(default = "default_feature_info_file")]
    pub feature_info_file: String,
    /// HTTP server binding and limits.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_file: default_model_file(),
            feature_info_file: default_feature_info_file(),
            server: ServerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Full path to the predictor artifact.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    /// Full path to the feature-schema descriptor.
    pub fn feature_info_path(&self) -> PathBuf {
        self.model_dir.join(&self.feature_info_file)
    }

    /// Apply environment variable overrides from the given lookup.
    ///
    /// Recognized variables: `MODEL_DIR`, `MODEL_FILE`, `FEATURE_INFO_FILE`,
    /// `BIND_HOST`, `BIND_PORT`. The lookup is injected so tests can run
    /// without mutating process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `BIND_PORT` is not a valid
    /// port number.
    pub fn override_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("MODEL_FILE") {
            self.model_file = file;
        }
        if let Some(file) = lookup("FEATURE_INFO_FILE") {
            self.feature_info_file = file;
        }
        if let Some(host) = lookup("BIND_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BIND_PORT") {
            self.server.port = port.parse::<u16>().map_err(|_| {
                ConfigError::Validation(format!("BIND_PORT must be a port number, got {port:?}"))
            })?;
        }
        Ok(())
    }
}

/// Load the service configuration: optional `CONFIG_PATH` TOML file, then
/// environment overrides, then validation.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file is unreadable or malformed, or if
/// the resulting configuration is invalid.
///
/// # Panics
///
/// This function never panics.
pub fn load() -> Result<ServiceConfig, ConfigError> {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load_from_file(Path::new(&path))?,
        Err(_) => ServiceConfig::default(),
    };

    config.override_from(|key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Load a [`ServiceConfig`] from a TOML file.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read.
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`ServiceConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Errors
///
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validate(&config)?;
    Ok(config)
}

/// Check semantic constraints the type system cannot express.
fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.model_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "model_file must not be empty".to_string(),
        ));
    }
    if config.feature_info_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "feature_info_file must not be empty".to_string(),
        ));
    }
    if config.server.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.host must not be empty".to_string(),
        ));
    }
    if config.server.max_request_size == 0 {
        return Err(ConfigError::Validation(
            "server.max_request_size must be positive".to_string(),
        ));
    }
    Ok(())
}
