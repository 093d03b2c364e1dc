//! Configuration types for bulk-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Top-level configuration for a batch run
///
/// Every field has a default, so an empty JSON object (`{}`) is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory downloads are written to (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Number of parallel fetch workers (default: 10)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// TCP/TLS connect timeout in seconds (default: 5)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum idle time waiting for headers or the next body chunk (default: 120)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// `User-Agent` header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Size of the copy buffer used when writing bodies to disk (default: 8192)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retry behavior for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            workers: default_workers(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
            chunk_size: default_chunk_size(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated before it is returned.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers", "must be at least 1"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout", "must be greater than zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::config("read_timeout", "must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size", "must be at least 1 byte"));
        }
        self.retry.validate()
    }
}

/// Retry configuration for the transport client
///
/// Delays grow as `initial_delay * backoff_multiplier^n`, capped at `max_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 0.5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries, also caps `Retry-After` (default: 120 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts", "must be at least 1"));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be a number >= 1.0",
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_workers() -> usize {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    concat!("bulk-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are written as (possibly fractional) seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid value for duration ({secs}): {e}")))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.workers, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.chunk_size, 8192);
        assert!(config.user_agent.starts_with("bulk-dl/"));

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert!(!config.retry.jitter);
        config.validate().unwrap();
    }

    #[test]
    fn empty_json_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.workers, 10);
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn durations_accept_fractional_seconds() {
        let json = r#"{"read_timeout": 30, "retry": {"initial_delay": 0.25}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"connect_timeout": -1}"#;
        let err = serde_json::from_str::<Config>(json).unwrap_err();
        assert!(
            err.to_string().contains("invalid value for duration"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn serialization_round_trips_through_seconds() {
        let config = Config::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["connect_timeout"], serde_json::json!(5.0));
        assert_eq!(value["retry"]["initial_delay"], serde_json::json!(0.5));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = Config {
            workers: 0,
            ..Default::default()
        };
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("workers")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_timeouts_are_invalid() {
        let config = Config {
            read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_settings_are_validated() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.backoff_multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_json_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulk-dl.json");

        std::fs::write(&path, r#"{"workers": 3, "download_dir": "pdfs"}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.download_dir, PathBuf::from("pdfs"));

        std::fs::write(&path, r#"{"workers": 0}"#).unwrap();
        assert!(matches!(
            Config::from_json_file(&path),
            Err(Error::Config { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::from_json_file(&missing),
            Err(Error::Io(_))
        ));
    }
}
