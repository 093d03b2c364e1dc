//! Error types for bulk-dl
//!
//! Errors are layered the same way the fetch pipeline is:
//! - [`NameResolutionError`] - destination naming failed (filesystem lookup errors only)
//! - [`TransportError`] - the HTTP exchange failed, after any retries
//! - [`WriteError`] - materialising the body on disk failed
//!
//! Every one of them is turned into a failed [`Outcome`](crate::types::Outcome) at the
//! fetch worker boundary, so none of them ever aborts a batch.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for bulk-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bulk-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Destination naming failed
    #[error(transparent)]
    NameResolution(#[from] NameResolutionError),

    /// HTTP transfer failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing the downloaded file failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// I/O error outside the per-request pipeline (input files, directory creation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a configuration key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while choosing a destination path
#[derive(Debug, Error)]
pub enum NameResolutionError {
    /// Inspecting the destination directory failed
    #[error("cannot inspect {path}: {source}")]
    Inspect {
        /// The candidate path that could not be checked
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Every numbered variant of the name is already taken
    #[error("no free name for {path} after {attempts} attempts")]
    Exhausted {
        /// The base candidate path
        path: PathBuf,
        /// How many numbered variants were tried
        attempts: u32,
    },
}

/// Errors raised by the HTTP transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed or uses an unsupported scheme
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status {
        /// The requested URL
        url: String,
        /// The HTTP status code
        status: u16,
        /// Delay requested through a `Retry-After` header, if any
        retry_after: Option<Duration>,
    },

    /// The request could not be completed (DNS, connect, reset, TLS, ...)
    #[error("request to {url} failed: {source}")]
    Request {
        /// The requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// No response headers arrived within the read timeout
    #[error("timed out after {timeout:?} waiting for {url}")]
    Timeout {
        /// The requested URL
        url: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Retries were used up on a transient failure
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// The error of the final attempt
        last: Box<TransportError>,
    },

    /// Reading the response body failed part-way through
    #[error("reading response body failed: {0}")]
    Body(#[source] std::io::Error),
}

impl TransportError {
    /// HTTP status carried by this error, looking through retry exhaustion
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Errors raised while writing a response body to disk
#[derive(Debug, Error)]
pub enum WriteError {
    /// The temporary `.part` file could not be created
    #[error("cannot create {path}: {source}")]
    Create {
        /// Path of the temporary file
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Writing or flushing the temporary file failed (disk full, I/O error, ...)
    #[error("cannot write {path}: {source}")]
    Write {
        /// Path of the temporary file
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// The body did not match the length the server declared
    #[error("expected {expected} bytes but received {received}")]
    LengthMismatch {
        /// Declared `Content-Length`
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Publishing the temporary file under its final name failed
    #[error("cannot rename {from} to {to}: {source}")]
    Publish {
        /// Path of the temporary file
        from: PathBuf,
        /// Final destination path
        to: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },
}
