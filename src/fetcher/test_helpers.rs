//! Shared test helpers: a scripted in-memory transport and fast retry settings.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result, TransportError};
use crate::transport::{FetchResponse, Transport, TransportFactory};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Config with millisecond retry delays and short timeouts
pub(crate) fn fast_config() -> Config {
    Config {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

/// Counters shared by every transport a [`FakeFactory`] builds
#[derive(Debug, Default)]
pub(crate) struct FakeStats {
    pub(crate) calls: AtomicUsize,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl FakeStats {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// In-memory transport
///
/// The URL decides the response:
/// - unparseable -> invalid URL error
/// - contains `missing` -> HTTP 404
/// - contains `panic` -> the call panics
/// - anything else -> 200 with the URL itself as the body, after `latency`
pub(crate) struct FakeTransport {
    stats: Arc<FakeStats>,
    latency: Duration,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> std::result::Result<FetchResponse, TransportError> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Err(e) = url::Url::parse(url) {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
        if url.contains("panic") {
            panic!("scripted transport panic for {url}");
        }
        if url.contains("missing") {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
                retry_after: None,
            });
        }

        let body = url.as_bytes().to_vec();
        Ok(FetchResponse {
            status: 200,
            content_length: Some(body.len() as u64),
            body: Box::pin(std::io::Cursor::new(body)),
        })
    }
}

/// Factory for [`FakeTransport`]s, optionally failing after `fail_after` builds
pub(crate) struct FakeFactory {
    pub(crate) stats: Arc<FakeStats>,
    pub(crate) latency: Duration,
    pub(crate) built: AtomicUsize,
    pub(crate) fail_after: Option<usize>,
}

impl FakeFactory {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            stats: Arc::new(FakeStats::default()),
            latency,
            built: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    pub(crate) fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    fn build(&self) -> Result<FakeTransport> {
        let built = self.built.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| built >= limit) {
            return Err(Error::config("user_agent", "scripted factory failure"));
        }
        Ok(FakeTransport {
            stats: Arc::clone(&self.stats),
            latency: self.latency,
        })
    }
}

/// Config writing into `dir` with `workers` workers
pub(crate) fn config_for(dir: &std::path::Path, workers: usize) -> Config {
    Config {
        download_dir: dir.to_path_buf(),
        workers,
        ..fast_config()
    }
}
