//! Per-leaf crawl status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CategoryId;
use crate::error::PipelineError;

/// Crawl state of a leaf category.
///
/// Within one attempt the state only moves forward:
/// `Pending → InProgress → {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    /// Created, no attempt started yet.
    Pending,
    /// An attempt is running.
    InProgress,
    /// The last attempt finished successfully.
    Completed,
    /// The last attempt stopped on an error.
    Failed,
}

impl CrawlState {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the persisted string form.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] for an unknown state string.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Internal(format!(
                "unknown crawl state `{other}`"
            ))),
        }
    }
}

/// Crawl status row of one leaf category. At most one exists per leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlStatus {
    /// Leaf category this status belongs to.
    pub category_id: CategoryId,
    /// Current state.
    pub state: CrawlState,
    /// Start time of the most recent attempt.
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl CrawlStatus {
    /// Creates the status row for a leaf that has never been crawled.
    #[must_use]
    pub const fn pending(category_id: CategoryId) -> Self {
        Self {
            category_id,
            state: CrawlState::Pending,
            last_crawled_at: None,
        }
    }

    /// Starts a new attempt: the row is reset to `Pending` and moved to
    /// `InProgress`, stamping `last_crawled_at`.
    ///
    /// An attempt still marked `InProgress` (e.g. left behind by a crashed
    /// process) is superseded. Returns the state before the reset.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> CrawlState {
        let previous = self.state;
        // A new attempt begins Pending; the caller holds it, so it is
        // immediately InProgress.
        self.state = CrawlState::InProgress;
        self.last_crawled_at = Some(now);
        previous
    }

    /// Marks the running attempt as completed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] if no attempt is running.
    pub fn complete(&mut self) -> Result<(), PipelineError> {
        self.finish(CrawlState::Completed)
    }

    /// Marks the running attempt as failed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] if no attempt is running.
    pub fn fail(&mut self) -> Result<(), PipelineError> {
        self.finish(CrawlState::Failed)
    }

    fn finish(&mut self, next: CrawlState) -> Result<(), PipelineError> {
        if self.state != CrawlState::InProgress {
            return Err(PipelineError::Internal(format!(
                "category {}: cannot move from {} to {}",
                self.category_id,
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        Ok(())
    }
}
