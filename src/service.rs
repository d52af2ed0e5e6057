//! Public entry points for embedding the sync engine in an application.
//!
//! [`SyncService`] wires the WordPress client, the SQLite store, the status
//! tracker and the scheduler together from a [`Config`], and exposes the
//! four operations callers need:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`sync_wordpress_posts`](SyncService::sync_wordpress_posts) | full cycle now |
//! | [`sync_single_wordpress_post`](SyncService::sync_single_wordpress_post) | resync one post |
//! | [`setup_wordpress_sync_schedule`](SyncService::setup_wordpress_sync_schedule) | (re)start periodic cycles |
//! | [`sync_status`](SyncService::sync_status) | snapshot of the tracker |
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! use std::time::Duration;
//! use wpsync::config::load_config;
//! use wpsync::service::SyncService;
//!
//! let config = load_config(std::path::Path::new("config/wpsync.toml"))?;
//! let service = SyncService::from_config(&config).await?;
//! let result = service.sync_wordpress_posts().await?;
//! println!("imported {} of {}", result.posts_imported, result.total_posts);
//! service.setup_wordpress_sync_schedule(Duration::from_secs(900));
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use wpsync_core::models::{SyncResult, SyncStatus};
use wpsync_core::store::{PostStore, RunLog};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::error::SyncError;
use crate::fetcher::WordPressClient;
use crate::migrate;
use crate::progress::ProgressReporter;
use crate::scheduler::{Scheduler, SyncTarget};
use crate::sqlite_store::SqliteStore;
use crate::sync::SyncEngine;
use crate::tracker::SyncTracker;

pub use wpsync_core::clean::clean_content;

pub struct SyncService {
    scheduler: Scheduler,
}

impl SyncService {
    /// Wrap an already-built engine.
    pub fn new(engine: Arc<SyncEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            scheduler: Scheduler::new(engine, clock),
        }
    }

    /// Open (and migrate) the configured database, build the WordPress
    /// client and seed the status from the last recorded run.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_progress(config, None).await
    }

    pub async fn from_config_with_progress(
        config: &Config,
        progress: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let client = WordPressClient::new(&config.remote)
            .with_context(|| format!("cannot build client for {}", config.remote.base_url))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let tracker = match store.last_run().await? {
            Some(last) => SyncTracker::with_status(clock.clone(), last),
            None => SyncTracker::new(clock.clone()),
        };

        let mut engine = SyncEngine::new(Arc::new(client), store.clone(), clock.clone())
            .with_run_log(store)
            .with_tracker(Arc::new(tracker))
            .with_page_size(config.remote.per_page)
            .with_max_pages(config.remote.max_pages);
        if let Some(progress) = progress {
            engine = engine.with_progress(progress);
        }

        let scheduler =
            Scheduler::new(Arc::new(engine), clock).run_on_start(config.schedule.run_on_start);
        Ok(Self { scheduler })
    }

    pub async fn sync_wordpress_posts(&self) -> Result<SyncResult, SyncError> {
        self.scheduler.sync_now(SyncTarget::All).await
    }

    pub async fn sync_single_wordpress_post(&self, remote_id: i64) -> Result<SyncResult, SyncError> {
        self.scheduler.sync_now(SyncTarget::Post(remote_id)).await
    }

    /// Start periodic full cycles, replacing any existing schedule.
    pub fn setup_wordpress_sync_schedule(&self, interval: Duration) {
        self.scheduler.start(interval);
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.scheduler.engine().status()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<dyn PostStore> {
        self.scheduler.engine().store()
    }

    /// Stop the schedule and wait for any in-flight cycle.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
