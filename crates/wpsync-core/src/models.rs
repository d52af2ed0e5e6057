//! Core data models shared by the fetcher, the reconciliation engine, and
//! the stores.
//!
//! Remote types ([`RemotePost`], [`RemoteCategory`]) are ephemeral and live
//! for one sync cycle. [`LocalPost`] is the persisted mirror, keyed by the
//! remote identifier. [`SyncStatus`] and [`SyncResult`] describe the outcome
//! of a cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post as returned by the remote content API, before cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    /// Remote identifier. Stable across syncs; the reconciliation key.
    pub remote_id: i64,
    pub title: String,
    /// Raw rendered HTML body.
    pub body: String,
    /// Raw rendered HTML excerpt.
    pub excerpt: String,
    /// Publication status (`publish`, `draft`, `private`, ...).
    pub status: String,
    pub slug: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
    pub category_ids: Vec<i64>,
    pub author_id: i64,
}

/// A category as returned by the remote content API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub post_count: i64,
}

/// Local-only moderation state. Never touched by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModerationFlags {
    pub hidden: bool,
    pub comments_locked: bool,
}

/// The mutable, remote-derived fields of a stored post.
///
/// This is the payload written on both insert and update; local-only
/// fields (primary key, moderation flags, `created_at`) are not part of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostFields {
    pub title: String,
    /// Cleaned, canonical HTML body.
    pub body: String,
    /// Plain-text excerpt.
    pub excerpt: String,
    pub status: String,
    pub slug: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Resolved category names, in remote order.
    pub categories: Vec<String>,
    pub author_id: i64,
    /// Remote `modified` timestamp of the revision being stored.
    pub updated_at: DateTime<Utc>,
    /// Local wall-clock time of the write.
    pub synced_at: DateTime<Utc>,
}

/// A post to be inserted for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub remote_id: i64,
    pub fields: PostFields,
}

/// A post mirrored into the local store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalPost {
    /// Local primary key. Never used for reconciliation.
    pub id: i64,
    pub remote_id: i64,
    #[serde(flatten)]
    pub fields: PostFields,
    pub moderation: ModerationFlags,
    pub created_at: DateTime<Utc>,
}

impl LocalPost {
    /// Remote modification time of the stored revision.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.fields.updated_at
    }
}

/// Lifecycle state of the sync engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Succeeded,
    Failed,
    Partial,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Succeeded => "succeeded",
            SyncState::Failed => "failed",
            SyncState::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SyncState::Idle),
            "syncing" => Some(SyncState::Syncing),
            "succeeded" => Some(SyncState::Succeeded),
            "failed" => Some(SyncState::Failed),
            "partial" => Some(SyncState::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the sync engine's state.
///
/// Counters describe the most recently *completed* cycle; only `state`
/// changes when a cycle starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub posts_imported: u64,
    pub total_posts: u64,
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }
}

/// Outcome of one sync cycle (full or single-post).
///
/// `posts_imported` is `created + updated`. `total_posts` is the total the
/// remote advertised for the query when known, otherwise the number of
/// posts fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub state: SyncState,
    pub posts_imported: u64,
    pub total_posts: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
