//! # bulk-dl
//!
//! Concurrent batch downloader: fetch a list of URLs into one directory with a
//! bounded pool of workers.
//!
//! ## Guarantees
//!
//! - **One outcome per URL** - every submitted URL ends as exactly one success or failure
//! - **No overwrites** - colliding names get a numeric suffix (`report_1.pdf`)
//! - **No partial files** - bodies land in `<name>.part` and are renamed only when complete
//! - **Bounded concurrency** - never more than `workers` transfers in flight
//! - **Transient failures are retried** - 429/5xx, timeouts and resets back off exponentially
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulk_dl::{Config, Dispatcher, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         download_dir: "pdfs".into(),
//!         workers: 4,
//!         ..Default::default()
//!     };
//!
//!     let dispatcher = Dispatcher::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = dispatcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Completed { url, path, .. } = event {
//!                 println!("{url} -> {}", path.display());
//!             }
//!         }
//!     });
//!
//!     let report = dispatcher
//!         .run(["https://example.com/a.pdf", "https://example.com/b.pdf"])
//!         .await?;
//!     for (url, error) in report.failures() {
//!         eprintln!("{url}: {error}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Worker pool and per-request state machine
pub mod fetcher;
/// URL list input
pub mod input;
/// Destination filename resolution
pub mod naming;
/// Retry logic with exponential backoff
pub mod retry;
/// HTTP transport
pub mod transport;
/// Core types and events
pub mod types;
/// Atomic `.part`-then-rename file writer
pub mod writer;

// Re-export commonly used types
pub use config::{Config, RetryConfig};
pub use error::{Error, NameResolutionError, Result, TransportError, WriteError};
pub use fetcher::{Dispatcher, FetchWorker, effective_workers};
pub use naming::NameResolver;
pub use transport::{
    FetchResponse, HttpTransport, HttpTransportFactory, Transport, TransportFactory,
};
pub use types::{BatchReport, Destination, Event, Outcome, Request, Stage};
pub use writer::AtomicWriter;

/// Download `urls` into `config.download_dir` with an HTTP dispatcher
///
/// Shorthand for [`Dispatcher::new`] followed by [`Dispatcher::run`].
pub async fn fetch_all<I, S>(config: Config, urls: I) -> Result<BatchReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Dispatcher::new(config)?.run(urls).await
}

/// Run a batch, cancelling it when a termination signal arrives.
///
/// In-flight downloads are abandoned without leaving `.part` files, and the report
/// still holds one outcome per URL.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bulk_dl::{Config, Dispatcher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new(Config::default())?;
///     let report = run_with_shutdown(&dispatcher, ["https://example.com/a.pdf"]).await?;
///     println!("{} failed", report.failed_count());
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown<F, I, S>(
    dispatcher: &Dispatcher<F>,
    urls: I,
) -> Result<BatchReport>
where
    F: TransportFactory,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let token = dispatcher.cancellation_token();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        token.cancel();
    });

    let report = dispatcher.run(urls).await;
    watcher.abort();
    report
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    // Registration can fail in restricted environments; a missing handler never fires
    fn register(kind: SignalKind, name: &'static str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(signal = name, error = %e, "Could not register signal handler"))
            .ok()
    }

    async fn next(handler: Option<&mut Signal>) {
        match handler {
            Some(handler) => {
                handler.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");
    if sigterm.is_none() && sigint.is_none() {
        return ctrl_c_or_never().await;
    }

    let received = tokio::select! {
        () = next(sigterm.as_mut()) => "SIGTERM",
        () = next(sigint.as_mut()) => "SIGINT",
    };
    tracing::info!(signal = received, "Received shutdown signal, cancelling batch");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

// A listener that cannot be installed must not cancel the batch
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, cancelling batch"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
