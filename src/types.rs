//! Core types for bulk-dl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix appended to a destination filename while its body is being written
pub const PART_SUFFIX: &str = ".part";

/// One URL to fetch
///
/// `index` is the position of the URL in the submitted list. It is what ties a
/// request to its single [`Outcome`], even when the same URL appears twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Position in the submitted batch
    pub index: usize,
    /// The URL to fetch
    pub url: String,
}

impl Request {
    /// Create a new request
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
        }
    }

    /// Build the request list for a batch, preserving submission order
    pub fn batch<I, S>(urls: I) -> Vec<Request>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| Request::new(index, url))
            .collect()
    }
}

/// Resolved local location for one request
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Directory the file is written to
    pub directory: PathBuf,
    /// Leaf filename, free of path separators
    pub filename: String,
}

impl Destination {
    /// Final path of the published file
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Path of the temporary file used while writing
    pub fn part_path(&self) -> PathBuf {
        self.directory.join(format!("{}{}", self.filename, PART_SUFFIX))
    }
}

/// Terminal result for one request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// The requested URL
    pub url: String,
    /// Whether the file was published
    pub success: bool,
    /// Final path on success, error description on failure
    pub detail: String,
}

impl Outcome {
    /// Successful outcome pointing at the published file
    pub fn succeeded(url: impl Into<String>, path: &Path) -> Self {
        Self {
            url: url.into(),
            success: true,
            detail: path.display().to_string(),
        }
    }

    /// Failed outcome carrying a human-readable cause
    pub fn failed(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            detail: detail.into(),
        }
    }
}

/// Stage of a single fetch
///
/// Transitions only move forward:
/// `Pending -> Resolving -> Fetching -> Writing -> Succeeded | Failed`,
/// and any non-terminal stage may jump straight to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Not picked up by a worker yet
    Pending,
    /// Choosing a destination filename
    Resolving,
    /// Waiting for the HTTP response
    Fetching,
    /// Streaming the body to disk
    Writing,
    /// File published
    Succeeded,
    /// Request abandoned
    Failed,
}

impl Stage {
    /// Whether the stage ends the request
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Pending, Stage::Resolving)
                | (Stage::Resolving, Stage::Fetching)
                | (Stage::Fetching, Stage::Writing)
                | (Stage::Writing, Stage::Succeeded)
        ) || (!self.is_terminal() && next == Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Resolving => "resolving",
            Stage::Fetching => "fetching",
            Stage::Writing => "writing",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Event emitted while a batch runs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A destination was reserved for a URL
    Resolved {
        /// The requested URL
        url: String,
        /// Where the file will be published
        path: PathBuf,
    },

    /// The HTTP request is being sent
    Fetching {
        /// The requested URL
        url: String,
    },

    /// The file was published
    Completed {
        /// The requested URL
        url: String,
        /// Final path of the file
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// The request failed
    Failed {
        /// The requested URL
        url: String,
        /// Stage in which the failure happened
        stage: Stage,
        /// Error description
        error: String,
    },

    /// Every request has an outcome
    BatchFinished {
        /// Number of requests in the batch
        total: usize,
        /// Number of failed requests
        failed: usize,
        /// Wall-clock duration of the batch
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
}

/// All outcomes of one batch, in completion order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Outcomes in the order they completed
    pub outcomes: Vec<Outcome>,
}

impl BatchReport {
    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when the batch had no requests
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Successful outcomes
    pub fn succeeded(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    /// Failed outcomes
    pub fn failed(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Number of successful outcomes
    pub fn succeeded_count(&self) -> usize {
        self.succeeded().count()
    }

    /// Number of failed outcomes
    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// `(url, error)` pairs for every failure, for selective retry
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failed()
            .map(|o| (o.url.clone(), o.detail.clone()))
            .collect()
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
