//! Sync cycle orchestration.
//!
//! A full cycle runs: admission → categories → pages (sequential) →
//! reconcile each page → record status. Each page is fully fetched before
//! any of its posts are written, and pages are requested oldest-modified
//! first, so an interrupted cycle has persisted a prefix of the changes.
//!
//! Outcome rules:
//! - fetch error before any page was reconciled → `failed`
//! - fetch error after at least one page → `partial`
//! - isolated write failures or malformed remote records → `partial`
//! - otherwise → `succeeded`
//!
//! A category fetch failure is logged and the cycle carries on with no
//! category names.

use std::sync::Arc;

use wpsync_core::models::{SyncResult, SyncState, SyncStatus};
use wpsync_core::reconcile::{self, CategoryIndex, Decision, ReconcileReport, WriteFailure};
use wpsync_core::store::{PostStore, RunLog};

use crate::clock::Clock;
use crate::config::MAX_PER_PAGE;
use crate::error::{FetchError, SyncError};
use crate::fetcher::ContentSource;
use crate::progress::{NoProgress, ProgressReporter, SyncProgressEvent};
use crate::tracker::{CycleOutcome, SyncTracker};

const DEFAULT_PER_PAGE: u32 = 50;
const DEFAULT_MAX_PAGES: u32 = 500;

/// Drives sync cycles against one content source and one store.
pub struct SyncEngine {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn PostStore>,
    run_log: Option<Arc<dyn RunLog>>,
    tracker: Arc<SyncTracker>,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressReporter>,
    per_page: u32,
    max_pages: u32,
}

/// What the page loop gathered before it stopped.
#[derive(Default)]
struct PageRun {
    report: ReconcileReport,
    pages_reconciled: u32,
    fetched: u64,
    advertised_total: Option<u64>,
    error: Option<String>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn PostStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker: Arc::new(SyncTracker::new(clock.clone())),
            source,
            store,
            run_log: None,
            clock,
            progress: Arc::new(NoProgress),
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Record every completed cycle.
    pub fn with_run_log(mut self, run_log: Arc<dyn RunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<SyncTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_page_size(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn tracker(&self) -> &Arc<SyncTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        self.tracker.status()
    }

    /// Run one full cycle over every page of remote posts.
    ///
    /// Returns `Err` only when admission is refused; a cycle that ran but
    /// failed is reported through [`SyncResult::success`].
    pub async fn sync_posts(&self) -> Result<SyncResult, SyncError> {
        let ticket = self.tracker.begin_sync()?;
        tracing::info!(per_page = self.per_page, "sync started");

        let categories = self.load_categories().await;
        let run = self.fetch_and_reconcile(&categories).await;

        let state = if run.error.is_some() && run.pages_reconciled == 0 {
            SyncState::Failed
        } else if run.error.is_some() || run.report.has_failures() {
            SyncState::Partial
        } else {
            SyncState::Succeeded
        };

        let error = join_errors(run.error, &run.report.failures);
        let total_posts = run.advertised_total.unwrap_or(run.fetched);
        let status = ticket.complete(CycleOutcome {
            state,
            error: error.clone(),
            posts_imported: run.report.imported(),
            total_posts,
        });
        self.record(&status).await;

        tracing::info!(
            state = %state,
            created = run.report.created,
            updated = run.report.updated,
            skipped = run.report.skipped,
            failed = run.report.failures.len(),
            total = total_posts,
            "sync finished"
        );

        Ok(build_result(state, &run.report, total_posts, error))
    }

    /// Re-fetch and reconcile one post by remote id.
    ///
    /// A post the remote does not have, or a failed write, fails the cycle.
    pub async fn sync_post(&self, remote_id: i64) -> Result<SyncResult, SyncError> {
        let ticket = self.tracker.begin_sync()?;
        tracing::info!(remote_id, "single-post sync started");

        let categories = self.load_categories().await;
        let mut report = ReconcileReport::default();
        let (state, total_posts, error) = match self.resync_one(remote_id, &categories).await {
            Ok(decision) => {
                match decision {
                    Decision::Create => report.created += 1,
                    Decision::Update { .. } => report.updated += 1,
                    Decision::Skip => report.skipped += 1,
                }
                (SyncState::Succeeded, 1, None)
            }
            Err(e) => {
                tracing::warn!(remote_id, error = %e, "single-post sync failed");
                let fetched = matches!(e, SyncError::ReconciliationWrite { .. });
                if let SyncError::ReconciliationWrite { remote_id, message } = &e {
                    report.failures.push(WriteFailure {
                        remote_id: *remote_id,
                        message: message.clone(),
                    });
                }
                (SyncState::Failed, u64::from(fetched), Some(e.to_string()))
            }
        };

        let status = ticket.complete(CycleOutcome {
            state,
            error: error.clone(),
            posts_imported: report.imported(),
            total_posts,
        });
        self.record(&status).await;

        Ok(build_result(state, &report, total_posts, error))
    }

    async fn resync_one(
        &self,
        remote_id: i64,
        categories: &CategoryIndex,
    ) -> Result<Decision, SyncError> {
        let remote = self.source.fetch_post(remote_id).await?.ok_or_else(|| {
            FetchError::fatal(format!("HTTP 404: post {} not found on remote", remote_id))
        })?;

        reconcile::reconcile_post(self.store.as_ref(), &remote, categories, self.clock.now())
            .await
            .map_err(|e| SyncError::ReconciliationWrite {
                remote_id,
                message: format!("{:#}", e),
            })
    }

    async fn load_categories(&self) -> CategoryIndex {
        match self.source.fetch_categories().await {
            Ok(categories) => {
                tracing::debug!(count = categories.len(), "fetched categories");
                CategoryIndex::new(&categories)
            }
            Err(e) => {
                tracing::warn!(error = %e, "category fetch failed, posts will have no category names");
                CategoryIndex::default()
            }
        }
    }

    async fn fetch_and_reconcile(&self, categories: &CategoryIndex) -> PageRun {
        let mut run = PageRun::default();
        let mut total_pages: Option<u32> = None;
        let mut page = 1u32;

        loop {
            if page > self.max_pages {
                tracing::warn!(max_pages = self.max_pages, "page cap reached, stopping cycle");
                break;
            }

            self.progress
                .report(SyncProgressEvent::FetchingPage { page, total_pages });

            let fetched = match self.source.fetch_posts(page, self.per_page).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(page, error = %e, "page fetch failed");
                    run.error = Some(format!("page {}: {}", page, e));
                    break;
                }
            };

            if run.advertised_total.is_none() {
                run.advertised_total = fetched.total;
            }
            total_pages = fetched.total_pages.or(total_pages);

            let count = fetched.len();
            tracing::debug!(page, count, rejected = fetched.rejected.len(), "fetched page");
            if count == 0 {
                break;
            }

            let batch =
                reconcile::reconcile(self.store.as_ref(), &fetched.posts, categories, self.clock.now())
                    .await;
            run.report.merge(batch);
            run.report
                .failures
                .extend(fetched.rejected.into_iter().map(|r| WriteFailure {
                    remote_id: r.remote_id.unwrap_or_default(),
                    message: r.reason,
                }));
            run.fetched += count as u64;
            run.pages_reconciled += 1;

            self.progress.report(SyncProgressEvent::Reconciling {
                n: run.report.processed(),
                total: run.advertised_total.unwrap_or(run.fetched),
            });

            if (count as u32) < self.per_page {
                break;
            }
            if matches!(total_pages, Some(last) if page >= last) {
                break;
            }
            page += 1;
        }

        run
    }

    async fn record(&self, status: &SyncStatus) {
        if let Some(run_log) = &self.run_log {
            if let Err(e) = run_log.record_run(status).await {
                tracing::warn!(error = %e, "failed to record sync run");
            }
        }
    }
}

fn join_errors(fetch_error: Option<String>, failures: &[WriteFailure]) -> Option<String> {
    let write_error = match failures {
        [] => None,
        [only] => Some(format!("post {}: {}", only.remote_id, only.message)),
        [first, rest @ ..] => Some(format!(
            "{} posts failed to write; first: post {}: {}",
            rest.len() + 1,
            first.remote_id,
            first.message
        )),
    };

    match (fetch_error, write_error) {
        (Some(f), Some(w)) => Some(format!("{}; {}", f, w)),
        (f, w) => f.or(w),
    }
}

fn build_result(
    state: SyncState,
    report: &ReconcileReport,
    total_posts: u64,
    error: Option<String>,
) -> SyncResult {
    SyncResult {
        success: state == SyncState::Succeeded,
        state,
        posts_imported: report.imported(),
        total_posts,
        created: report.created,
        updated: report.updated,
        skipped: report.skipped,
        failed: report.failures.len() as u64,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(remote_id: i64) -> WriteFailure {
        WriteFailure {
            remote_id,
            message: "disk I/O error".to_string(),
        }
    }

    #[test]
    fn join_errors_summarises() {
        assert_eq!(join_errors(None, &[]), None);
        assert_eq!(
            join_errors(None, &[failure(5)]).as_deref(),
            Some("post 5: disk I/O error")
        );
        assert_eq!(
            join_errors(None, &[failure(5), failure(6)]).as_deref(),
            Some("2 posts failed to write; first: post 5: disk I/O error")
        );
        assert_eq!(
            join_errors(Some("page 2: HTTP 503".to_string()), &[failure(5)]).as_deref(),
            Some("page 2: HTTP 503; post 5: disk I/O error")
        );
    }

    #[test]
    fn result_success_tracks_state() {
        let report = ReconcileReport {
            created: 2,
            updated: 1,
            skipped: 4,
            failures: vec![failure(9)],
        };
        let result = build_result(SyncState::Partial, &report, 8, Some("x".to_string()));
        assert!(!result.success);
        assert_eq!(result.posts_imported, 3);
        assert_eq!(result.failed, 1);
        assert!(build_result(SyncState::Succeeded, &ReconcileReport::default(), 0, None).success);
    }
}
