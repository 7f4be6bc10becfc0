//! Layered configuration for [`bootstrap::init`](crate::bootstrap::init).
//!
//! Config *discovery* (search paths, profiles) is out of scope for this
//! kernel — see `SPEC_FULL.md` §10.2 — but the loader itself still has to
//! exist as the other end of the bootstrap contract. Layering, lowest to
//! highest precedence: [`KernelConfig::default`], an optional `kernel.toml`
//! next to the current directory, then `KERNEL_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Resolved kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// `tracing` filter directive applied by [`bootstrap::init`](crate::bootstrap::init)
    /// (e.g. `"info"`, `"debug"`, `"kernel_core=trace"`).
    pub log_level: String,

    /// Default timeout passed to [`Deferred::wait`](kernel_core::Deferred::wait)
    /// by callers that don't specify one explicitly. Purely advisory; the
    /// core itself has no notion of a default timeout.
    pub default_wait_timeout: Duration,

    /// Whether a double-completion should abort the process in debug builds
    /// (via [`bootstrap`](crate::bootstrap)'s [`FailureSink`](kernel_core::FailureSink)
    /// wrapper) instead of merely being logged. Ignored in release builds.
    pub fatal_double_completion: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_wait_timeout: Duration::from_secs(30),
            fatal_double_completion: false,
        }
    }
}

/// On-disk representation of `kernel.toml`. Every field is optional so a
/// partial file only overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    log_level: Option<String>,
    default_wait_timeout_secs: Option<u64>,
    fatal_double_completion: Option<bool>,
}

/// Errors encountered while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnv { name: String, value: String },
}

impl KernelConfig {
    /// Loads configuration from defaults, an optional `kernel.toml` in the
    /// current directory, and `KERNEL_*` environment variable overrides.
    ///
    /// A missing `kernel.toml` is not an error; a present-but-unparseable
    /// one is.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("kernel.toml"))
    }

    /// Like [`load`](Self::load), reading the layered file from `path`
    /// instead of the default `kernel.toml`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            if let Some(log_level) = file.log_level {
                config.log_level = log_level;
            }
            if let Some(secs) = file.default_wait_timeout_secs {
                config.default_wait_timeout = Duration::from_secs(secs);
            }
            if let Some(fatal) = file.fatal_double_completion {
                config.fatal_double_completion = fatal;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("KERNEL_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Ok(value) = std::env::var("KERNEL_WAIT_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "KERNEL_WAIT_TIMEOUT_SECS".to_string(),
                value: value.clone(),
            })?;
            self.default_wait_timeout = Duration::from_secs(secs);
        }
        if let Ok(value) = std::env::var("KERNEL_FATAL_DOUBLE_COMPLETION") {
            let fatal: bool = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "KERNEL_FATAL_DOUBLE_COMPLETION".to_string(),
                value: value.clone(),
            })?;
            self.fatal_double_completion = fatal;
        }
        Ok(())
    }
}
