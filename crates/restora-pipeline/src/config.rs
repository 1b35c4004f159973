//! Runtime configuration, loaded from a TOML file.
//!
//! Every field has a default, so an absent file or an empty one is a
//! working configuration. Secrets (API tokens) are deliberately not part
//! of this file; they come from the environment.
//!
//! ```toml
//! [service]
//! base_url = "https://api.replicate.com/v1"
//! request_timeout_secs = 300
//!
//! [polling]
//! interval_ms = 2000
//! timeout_secs = 1800
//! cancel_on_timeout = false
//!
//! [hosting]
//! upload_url = "https://api.imgbb.com/1/upload"
//!
//! [output]
//! directory = "results"
//! prefix = "restored"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration TOML.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoraConfig {
    /// Inference service connection.
    pub service: ServiceConfig,
    /// Job polling behavior.
    pub polling: PollingConfig,
    /// Object host connection.
    pub hosting: HostingConfig,
    /// Where result records are written.
    pub output: OutputConfig,
}

impl RestoraConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid configuration.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

/// Inference service connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Ceiling on any single HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    /// Default API root.
    pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

    /// Default per-request ceiling.
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// How jobs are polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between status polls, in milliseconds.
    pub interval_ms: u64,
    /// Ceiling on waiting for one job, in seconds.
    pub timeout_secs: u64,
    /// Issue a cancel request for jobs that time out.
    pub cancel_on_timeout: bool,
}

impl PollingConfig {
    /// Default pause between polls.
    pub const DEFAULT_INTERVAL_MS: u64 = 2_000;

    /// Default ceiling on waiting for one job.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 1_800;

    /// Pause between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Ceiling on waiting for one job.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::DEFAULT_INTERVAL_MS,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            cancel_on_timeout: false,
        }
    }
}

/// Object host connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    /// Upload endpoint.
    pub upload_url: String,
    /// Ceiling on any single upload or download, in seconds.
    pub request_timeout_secs: u64,
}

impl HostingConfig {
    /// Default upload endpoint.
    pub const DEFAULT_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            upload_url: Self::DEFAULT_UPLOAD_URL.to_owned(),
            request_timeout_secs: ServiceConfig::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Where and under what name results are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for result records and masks.
    pub directory: PathBuf,
    /// File name prefix of result records.
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("results"),
            prefix: "restored".to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config: RestoraConfig = toml::from_str("").unwrap();
        assert_eq!(config, RestoraConfig::default());
        assert_eq!(config.polling.interval(), Duration::from_secs(2));
        assert_eq!(config.service.request_timeout_secs, 300);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: RestoraConfig = toml::from_str(
            r#"
            [polling]
            timeout_secs = 60

            [output]
            prefix = "testimg"
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.timeout(), Duration::from_secs(60));
        assert_eq!(config.polling.interval_ms, PollingConfig::DEFAULT_INTERVAL_MS);
        assert_eq!(config.output.prefix, "testimg");
        assert_eq!(config.output.directory, PathBuf::from("results"));
    }

    #[test]
    fn load_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restora.toml");
        std::fs::write(&path, "[polling]\ninterval_ms = \"soon\"\n").unwrap();
        let err = RestoraConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RestoraConfig::load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = RestoraConfig::default();
        config.polling.cancel_on_timeout = true;
        let text = toml::to_string(&config).unwrap();
        let back: RestoraConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
