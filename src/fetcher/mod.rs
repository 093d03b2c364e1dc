//! Batch fetching
//!
//! The [`Dispatcher`] runs a fixed pool of [`FetchWorker`]s over a batch of URLs:
//! - [`worker`] - single-request state machine (resolve, fetch, write)
//!
//! Workers drain a shared queue, so at most `workers` transfers are in flight at any
//! time. Outcomes are collected in completion order and every submitted URL gets
//! exactly one.

mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use worker::FetchWorker;

use crate::config::Config;
use crate::error::Result;
use crate::naming::NameResolver;
use crate::transport::{HttpTransportFactory, TransportFactory};
use crate::types::{BatchReport, Event, Outcome, Request};
use crate::writer::AtomicWriter;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Detail recorded for a request whose fetch panicked
const FETCH_PANICKED_DETAIL: &str = "download panicked";

/// Detail recorded for requests lost to a crashed worker
const WORKER_LOST_DETAIL: &str = "worker terminated unexpectedly";

/// Detail recorded for requests interrupted or skipped by cancellation
const CANCELLED_DETAIL: &str = "cancelled";

/// Number of workers actually spawned for a batch of `requests`
pub fn effective_workers(workers: usize, requests: usize) -> usize {
    workers.min(requests).max(1)
}

/// Runs batches of downloads over a bounded worker pool
pub struct Dispatcher<F: TransportFactory = HttpTransportFactory> {
    factory: F,
    workers: usize,
    download_dir: PathBuf,
    writer: AtomicWriter,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Dispatcher<HttpTransportFactory> {
    /// Create a dispatcher fetching over HTTP with the settings in `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let factory = HttpTransportFactory::new(config.clone());
        Ok(Self::with_factory(&config, factory))
    }
}

impl<F: TransportFactory> Dispatcher<F> {
    /// Create a dispatcher using a custom transport factory
    pub fn with_factory(config: &Config, factory: F) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            factory,
            workers: config.workers,
            download_dir: config.download_dir.clone(),
            writer: AtomicWriter::new(config.chunk_size),
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to progress events
    ///
    /// Slow receivers may observe `RecvError::Lagged`; outcomes are unaffected.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the dispatcher
    ///
    /// Once cancelled, in-flight transfers are abandoned (their `.part` files are
    /// removed) and queued requests are not started. Every request still gets an
    /// outcome. Cancellation is permanent for this dispatcher.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download every URL in `urls` and return all outcomes
    ///
    /// Returns `Err` only for setup failures (creating the download directory or
    /// building a transport), before any request is dispatched. Per-URL failures are
    /// reported as failed outcomes.
    pub async fn run<I, S>(&self, urls: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = Request::batch(urls);
        let total = requests.len();
        let started = Instant::now();

        if total == 0 {
            tracing::info!("Empty batch, nothing to download");
            self.finish(&BatchReport::default(), started);
            return Ok(BatchReport::default());
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;

        let worker_count = effective_workers(self.workers, total);
        let transports = (0..worker_count)
            .map(|_| self.factory.build())
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            total,
            workers = worker_count,
            dir = %self.download_dir.display(),
            "Starting batch"
        );

        let resolver = Arc::new(NameResolver::new(&self.download_dir));
        let queue = Arc::new(Mutex::new(requests.iter().cloned().collect::<VecDeque<_>>()));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<(usize, Outcome)>();

        let mut handles = Vec::with_capacity(worker_count);
        for (worker_id, transport) in transports.into_iter().enumerate() {
            let worker = FetchWorker::new(
                transport,
                Arc::clone(&resolver),
                self.writer,
                self.event_tx.clone(),
            );
            let queue = Arc::clone(&queue);
            let outcome_tx = outcome_tx.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                while !cancel.is_cancelled() {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(request) = next else {
                        break;
                    };

                    // A panic fails only this request; the worker keeps draining the queue
                    let fetch = AssertUnwindSafe(worker.fetch(&request)).catch_unwind();
                    let outcome = tokio::select! {
                        result = fetch => result.unwrap_or_else(|_| {
                            tracing::error!(url = %request.url, worker_id, "Download panicked");
                            Outcome::failed(&request.url, FETCH_PANICKED_DETAIL)
                        }),
                        () = cancel.cancelled() => {
                            tracing::info!(url = %request.url, "Download cancelled");
                            Outcome::failed(&request.url, CANCELLED_DETAIL)
                        }
                    };
                    if outcome_tx.send((request.index, outcome)).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker_id, "Worker finished");
            }));
        }
        drop(outcome_tx);

        let mut reported = vec![false; total];
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(total),
        };
        while let Some((index, outcome)) = outcome_rx.recv().await {
            if let Some(slot) = reported.get_mut(index) {
                *slot = true;
            }
            report.outcomes.push(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Fetch worker terminated unexpectedly");
            }
        }

        // Requests skipped after cancellation, or held by a crashed worker
        let detail = if self.cancel.is_cancelled() {
            CANCELLED_DETAIL
        } else {
            WORKER_LOST_DETAIL
        };
        for request in &requests {
            if !reported[request.index] {
                tracing::warn!(url = %request.url, detail, "No outcome reported, marking as failed");
                report.outcomes.push(Outcome::failed(&request.url, detail));
            }
        }

        self.finish(&report, started);
        Ok(report)
    }

    fn finish(&self, report: &BatchReport, started: Instant) {
        let elapsed = started.elapsed();
        tracing::info!(
            total = report.len(),
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            elapsed_ms = elapsed.as_millis(),
            "Batch finished"
        );
        self.event_tx
            .send(Event::BatchFinished {
                total: report.len(),
                failed: report.failed_count(),
                elapsed,
            })
            .ok();
    }
}
