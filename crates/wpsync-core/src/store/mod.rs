//! Storage abstraction for wpsync.
//!
//! The [`PostStore`] trait is the only surface the reconciliation engine
//! writes through, enabling pluggable backends (SQLite in the runtime
//! crate, in-memory here). [`RunLog`] persists completed sync cycles so
//! the last outcome survives the process that produced it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must make each `insert`/`update` atomic: a write either lands fully or
//! returns an error.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{LocalPost, NewPost, PostFields, SyncStatus};

/// Abstract post store, keyed by remote identifier.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](PostStore::get) | Look up a post by remote id |
/// | [`insert`](PostStore::insert) | Insert a new post, returning the local id |
/// | [`update`](PostStore::update) | Overwrite the remote-derived fields of a post |
/// | [`list`](PostStore::list) | All stored posts, ordered by remote id |
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Look up the local post mirroring `remote_id`.
    async fn get(&self, remote_id: i64) -> Result<Option<LocalPost>>;

    /// Insert a post. Fails if a post with the same remote id exists.
    async fn insert(&self, post: &NewPost) -> Result<i64>;

    /// Overwrite the remote-derived fields of the post with local id `id`.
    ///
    /// Local-only fields (moderation flags, `created_at`) are left as-is.
    async fn update(&self, id: i64, fields: &PostFields) -> Result<()>;

    /// All stored posts, ordered by remote id.
    async fn list(&self) -> Result<Vec<LocalPost>>;
}

/// Persistent log of completed sync cycles.
#[async_trait]
pub trait RunLog: Send + Sync {
    /// Append the status produced by a completed cycle.
    async fn record_run(&self, status: &SyncStatus) -> Result<()>;

    /// The most recently recorded cycle, if any.
    async fn last_run(&self) -> Result<Option<SyncStatus>>;
}
