//! Fetch worker: drives one request through resolve, fetch and write

use crate::error::Result;
use crate::naming::NameResolver;
use crate::transport::Transport;
use crate::types::{Event, Outcome, Request, Stage};
use crate::writer::AtomicWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Processes requests one at a time with its own transport
pub struct FetchWorker<T> {
    transport: T,
    resolver: Arc<NameResolver>,
    writer: AtomicWriter,
    event_tx: broadcast::Sender<Event>,
}

impl<T: Transport> FetchWorker<T> {
    /// Create a worker sharing `resolver` with the rest of the pool
    pub fn new(
        transport: T,
        resolver: Arc<NameResolver>,
        writer: AtomicWriter,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            resolver,
            writer,
            event_tx,
        }
    }

    /// Run `request` to a terminal stage
    ///
    /// Never fails: every error becomes a failed [`Outcome`].
    pub async fn fetch(&self, request: &Request) -> Outcome {
        let mut stage = Stage::Pending;

        match self.run(request, &mut stage).await {
            Ok((path, bytes)) => {
                tracing::info!(url = %request.url, path = %path.display(), bytes, "Download complete");
                self.emit(Event::Completed {
                    url: request.url.clone(),
                    path: path.clone(),
                    bytes,
                });
                Outcome::succeeded(&request.url, &path)
            }
            Err(e) => {
                let failed_in = stage;
                advance(&mut stage, Stage::Failed, &request.url);
                tracing::warn!(url = %request.url, stage = %failed_in, error = %e, "Download failed");
                self.emit(Event::Failed {
                    url: request.url.clone(),
                    stage: failed_in,
                    error: e.to_string(),
                });
                Outcome::failed(&request.url, e.to_string())
            }
        }
    }

    async fn run(&self, request: &Request, stage: &mut Stage) -> Result<(PathBuf, u64)> {
        let url = request.url.as_str();

        advance(stage, Stage::Resolving, url);
        let destination = self.resolver.resolve(url)?;
        self.emit(Event::Resolved {
            url: url.to_string(),
            path: destination.path(),
        });

        advance(stage, Stage::Fetching, url);
        self.emit(Event::Fetching {
            url: url.to_string(),
        });
        let mut response = self.transport.get(url).await?;

        advance(stage, Stage::Writing, url);
        let bytes = self
            .writer
            .write(&mut response.body, &destination, response.content_length)
            .await?;

        advance(stage, Stage::Succeeded, url);
        Ok((destination.path(), bytes))
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

fn advance(stage: &mut Stage, next: Stage, url: &str) {
    debug_assert!(
        stage.can_advance_to(next),
        "illegal transition {stage} -> {next}"
    );
    tracing::debug!(url = %url, from = %stage, to = %next, "Stage transition");
    *stage = next;
}
