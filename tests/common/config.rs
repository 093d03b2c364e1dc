//! Test configuration helpers

use bulk_dl::{Config, RetryConfig};
use std::path::Path;
use std::time::Duration;

/// Config writing into `download_dir`, with millisecond retry delays
pub fn fast_config(download_dir: &Path, workers: usize) -> Config {
    Config {
        download_dir: download_dir.to_path_buf(),
        workers,
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

/// Write `config` as JSON into `dir` and return its path
pub fn write_config_file(dir: &Path, config: &Config) -> std::path::PathBuf {
    let path = dir.join("bulk-dl.json");
    let json = serde_json::to_string_pretty(config).expect("config serializes");
    std::fs::write(&path, json).expect("config file written");
    path
}
