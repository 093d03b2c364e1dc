//! HTTP transport
//!
//! A [`Transport`] performs one logical GET: it retries transient failures with
//! exponential backoff and hands back the response body as an async reader once the
//! server has answered with a success status. Each fetch worker owns its own
//! transport so connections are reused across the requests that worker handles.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result, TransportError};
use crate::retry::{is_idempotent, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

/// Response body as a byte stream
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// A successful response, ready to be streamed to disk
pub struct FetchResponse {
    /// HTTP status code (always a success code)
    pub status: u16,
    /// Declared `Content-Length`, if the server sent one
    pub content_length: Option<u64>,
    /// Response body
    pub body: BodyReader,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Performs GET requests for a fetch worker
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`, retrying transient failures
    ///
    /// Returns once response headers with a success status have arrived. Errors
    /// reading the body later surface through the returned reader.
    async fn get(&self, url: &str) -> std::result::Result<FetchResponse, TransportError>;
}

/// Builds one [`Transport`] per worker
pub trait TransportFactory: Send + Sync {
    /// Transport type handed to each worker
    type Transport: Transport + 'static;

    /// Build a fresh transport
    fn build(&self) -> Result<Self::Transport>;
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry: RetryConfig,
}

impl HttpTransport {
    /// Create a transport from the connection and retry settings in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                Error::config("user_agent", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            retry: config.retry.clone(),
        })
    }

    /// Send a request and wait for a success status
    ///
    /// Only idempotent methods are retried; anything else gets exactly one attempt.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let parsed = parse_url(url)?;

        if is_idempotent(&method) {
            retry_with_backoff(&self.retry, || self.send_once(method.clone(), &parsed)).await
        } else {
            self.send_once(method, &parsed).await
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        // Headers must arrive within one connect plus one read window
        let deadline = self.connect_timeout + self.read_timeout;
        let send = self.client.request(method, url.clone()).send();

        let response = match tokio::time::timeout(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(TransportError::Request {
                    url: url.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::Timeout {
                    url: url.to_string(),
                    timeout: deadline,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = match status.as_u16() {
                429 | 503 => parse_retry_after(response.headers()),
                _ => None,
            };
            tracing::debug!(url = %url, status = status.as_u16(), "Server returned error status");
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> std::result::Result<FetchResponse, TransportError> {
        let response = self.request(Method::GET, url).await?;
        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: into_body_reader(response, self.read_timeout),
        })
    }
}

/// Builds an [`HttpTransport`] per worker from a shared [`Config`]
#[derive(Clone, Debug)]
pub struct HttpTransportFactory {
    config: Config,
}

impl HttpTransportFactory {
    /// Create a factory for `config`
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl TransportFactory for HttpTransportFactory {
    type Transport = HttpTransport;

    fn build(&self) -> Result<HttpTransport> {
        HttpTransport::new(&self.config)
    }
}

fn parse_url(url: &str) -> std::result::Result<Url, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Parse a delta-seconds `Retry-After` header
///
/// The HTTP-date form is ignored and falls back to regular backoff.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// Each chunk must arrive within `read_timeout`; the reader ends after the first error.
fn into_body_reader(response: reqwest::Response, read_timeout: Duration) -> BodyReader {
    let chunks = futures::stream::unfold(Some(response), move |state| async move {
        let Some(mut response) = state else {
            return None;
        };

        match tokio::time::timeout(read_timeout, response.chunk()).await {
            Ok(Ok(Some(chunk))) => Some((Ok(chunk), Some(response))),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => Some((Err(io::Error::other(e)), None)),
            Err(_) => Some((
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data received for {read_timeout:?}"),
                )),
                None,
            )),
        }
    });

    Box::pin(StreamReader::new(chunks))
}
