//! Single-flight sync status tracker.
//!
//! [`SyncTracker`] owns the one [`SyncStatus`] for the process. A cycle is
//! admitted by [`SyncTracker::begin_sync`], which flips the state to
//! `syncing` and hands back a [`SyncTicket`]. The ticket is the only way to
//! finish the cycle: [`SyncTicket::complete`] replaces every counter in one
//! step, and dropping the ticket without completing it records the cycle as
//! failed so the guard is always released.

use std::sync::{Arc, Mutex, MutexGuard};

use wpsync_core::models::{SyncState, SyncStatus};

use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;

const ABORTED: &str = "sync cycle aborted before completion";

/// Terminal values for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: SyncState,
    pub error: Option<String>,
    pub posts_imported: u64,
    pub total_posts: u64,
}

pub struct SyncTracker {
    status: Mutex<SyncStatus>,
    clock: Arc<dyn Clock>,
}

impl SyncTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            status: Mutex::new(SyncStatus::default()),
            clock,
        }
    }

    /// Start from a previously recorded status (e.g. the last run log
    /// entry). A persisted `syncing` state is never resumed.
    pub fn with_status(clock: Arc<dyn Clock>, mut status: SyncStatus) -> Self {
        if status.is_syncing() {
            status.state = SyncState::Failed;
            status.last_error = Some(ABORTED.to_string());
        }
        Self {
            status: Mutex::new(status),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a cycle, or reject it without touching the status.
    pub fn begin_sync(self: &Arc<Self>) -> Result<SyncTicket, SyncError> {
        let mut status = self.lock();
        if status.is_syncing() {
            return Err(SyncError::AlreadyInProgress);
        }
        status.state = SyncState::Syncing;
        status.last_error = None;
        Ok(SyncTicket {
            tracker: Arc::clone(self),
            completed: false,
        })
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> SyncStatus {
        self.lock().clone()
    }

    fn finish(&self, outcome: CycleOutcome) -> SyncStatus {
        let now = self.clock.now();
        let mut status = self.lock();
        *status = SyncStatus {
            state: outcome.state,
            last_sync_time: Some(now),
            last_error: outcome.error,
            posts_imported: outcome.posts_imported,
            total_posts: outcome.total_posts,
        };
        status.clone()
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Proof of admission for one in-flight cycle.
#[must_use = "a dropped ticket records the cycle as failed"]
pub struct SyncTicket {
    tracker: Arc<SyncTracker>,
    completed: bool,
}

impl SyncTicket {
    /// Record the cycle's outcome and release the guard.
    pub fn complete(mut self, outcome: CycleOutcome) -> SyncStatus {
        self.completed = true;
        self.tracker.finish(outcome)
    }
}

impl Drop for SyncTicket {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let previous = self.tracker.status();
        tracing::warn!("{}", ABORTED);
        self.tracker.finish(CycleOutcome {
            state: SyncState::Failed,
            error: Some(ABORTED.to_string()),
            posts_imported: previous.posts_imported,
            total_posts: previous.total_posts,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn tracker() -> Arc<SyncTracker> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 31, 12, 0, 0).unwrap());
        Arc::new(SyncTracker::new(Arc::new(clock)))
    }

    #[test]
    fn second_begin_is_rejected_and_status_untouched() {
        let tracker = tracker();
        let ticket = tracker.begin_sync().unwrap();
        let during = tracker.status();
        assert!(during.is_syncing());

        assert!(matches!(
            tracker.begin_sync(),
            Err(SyncError::AlreadyInProgress)
        ));
        assert_eq!(tracker.status(), during);

        ticket.complete(CycleOutcome {
            state: SyncState::Succeeded,
            error: None,
            posts_imported: 3,
            total_posts: 3,
        });
        assert!(tracker.begin_sync().is_ok());
    }

    #[test]
    fn complete_replaces_all_counters() {
        let tracker = tracker();
        let status = tracker.begin_sync().unwrap().complete(CycleOutcome {
            state: SyncState::Partial,
            error: Some("page 2: HTTP 503".to_string()),
            posts_imported: 50,
            total_posts: 100,
        });

        assert_eq!(status, tracker.status());
        assert_eq!(status.state, SyncState::Partial);
        assert_eq!(status.posts_imported, 50);
        assert_eq!(status.total_posts, 100);
        assert_eq!(
            status.last_sync_time,
            Some(Utc.with_ymd_and_hms(2024, 10, 31, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn dropped_ticket_records_failure() {
        let tracker = tracker();
        tracker.begin_sync().unwrap().complete(CycleOutcome {
            state: SyncState::Succeeded,
            error: None,
            posts_imported: 7,
            total_posts: 7,
        });

        drop(tracker.begin_sync().unwrap());

        let status = tracker.status();
        assert_eq!(status.state, SyncState::Failed);
        assert_eq!(status.last_error.as_deref(), Some(ABORTED));
        assert_eq!(status.posts_imported, 7);
        assert!(tracker.begin_sync().is_ok());
    }

    #[test]
    fn previous_error_is_cleared_while_syncing() {
        let tracker = tracker();
        tracker.begin_sync().unwrap().complete(CycleOutcome {
            state: SyncState::Failed,
            error: Some("page 1: HTTP 503".to_string()),
            posts_imported: 0,
            total_posts: 0,
        });
        assert!(tracker.status().last_error.is_some());

        let ticket = tracker.begin_sync().unwrap();
        let during = tracker.status();
        assert!(during.is_syncing());
        assert_eq!(during.last_error, None);

        let done = ticket.complete(CycleOutcome {
            state: SyncState::Succeeded,
            error: None,
            posts_imported: 2,
            total_posts: 2,
        });
        assert_eq!(done.last_error, None);
    }

    #[test]
    fn persisted_syncing_state_is_not_resumed() {
        let status = SyncStatus {
            state: SyncState::Syncing,
            ..SyncStatus::default()
        };
        let tracker = Arc::new(SyncTracker::with_status(Arc::new(SystemClock), status));
        assert_eq!(tracker.status().state, SyncState::Failed);
        assert!(tracker.begin_sync().is_ok());
    }
}
