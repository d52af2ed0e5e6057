//! Reconciliation: decide create / update / skip for each remote post and
//! apply the decision through a [`PostStore`].
//!
//! The remote identifier is the reconciliation key. A stored post is
//! overwritten only when the remote revision is strictly newer than the
//! stored one (`remote.modified_at > local.updated_at`); equal timestamps
//! skip, so re-running over unchanged remote data never writes.
//!
//! Failures are isolated per post: a failed lookup or write is recorded in
//! [`ReconcileReport::failures`] and the batch carries on.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clean::{clean_content, clean_text};
use crate::models::{LocalPost, NewPost, PostFields, RemoteCategory, RemotePost};
use crate::store::PostStore;

/// Category id → display name lookup for one cycle.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    names: HashMap<i64, String>,
}

impl CategoryIndex {
    pub fn new(categories: &[RemoteCategory]) -> Self {
        Self {
            names: categories
                .iter()
                .map(|c| (c.id, clean_text(&c.name)))
                .collect(),
        }
    }

    /// Resolve ids to names, preserving order. Unknown ids are dropped.
    pub fn resolve(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.names.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// What reconciliation did (or would do) with one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update { id: i64 },
    Skip,
}

/// Decide what to do with `remote` given its stored counterpart.
///
/// Timestamps are compared at microsecond granularity, the precision
/// stores keep.
pub fn decide(remote: &RemotePost, local: Option<&LocalPost>) -> Decision {
    match local {
        None => Decision::Create,
        Some(local)
            if remote.modified_at.timestamp_micros() > local.updated_at().timestamp_micros() =>
        {
            Decision::Update { id: local.id }
        }
        Some(_) => Decision::Skip,
    }
}

/// Build the cleaned, storable fields for a remote post.
pub fn prepare_fields(
    remote: &RemotePost,
    categories: &CategoryIndex,
    now: DateTime<Utc>,
) -> PostFields {
    PostFields {
        title: clean_text(&remote.title),
        body: clean_content(&remote.body),
        excerpt: clean_text(&remote.excerpt),
        status: remote.status.clone(),
        slug: remote.slug.clone(),
        link: remote.link.clone(),
        published_at: remote.published_at,
        categories: categories.resolve(&remote.category_ids),
        author_id: remote.author_id,
        updated_at: remote.modified_at,
        synced_at: now,
    }
}

/// A post whose lookup or write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub remote_id: i64,
    pub message: String,
}

/// Counters for one or more reconciled batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failures: Vec<WriteFailure>,
}

impl ReconcileReport {
    /// Posts written (`created + updated`).
    pub fn imported(&self) -> u64 {
        self.created + self.updated
    }

    /// Posts seen, whatever the outcome.
    pub fn processed(&self) -> u64 {
        self.created + self.updated + self.skipped + self.failures.len() as u64
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fold another batch's counters into this one.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}

/// Reconcile a single post. Errors are lookup or write failures.
pub async fn reconcile_post(
    store: &dyn PostStore,
    remote: &RemotePost,
    categories: &CategoryIndex,
    now: DateTime<Utc>,
) -> Result<Decision> {
    // Cleaned up front: cleaning is pure and cheap, and every post in the
    // batch goes through the same path regardless of the decision.
    let fields = prepare_fields(remote, categories, now);

    let existing = store.get(remote.remote_id).await?;
    let decision = decide(remote, existing.as_ref());

    match decision {
        Decision::Create => {
            store
                .insert(&NewPost {
                    remote_id: remote.remote_id,
                    fields,
                })
                .await?;
        }
        Decision::Update { id } => store.update(id, &fields).await?,
        Decision::Skip => {}
    }

    Ok(decision)
}

/// Reconcile a batch of remote posts, in order, against `store`.
pub async fn reconcile(
    store: &dyn PostStore,
    posts: &[RemotePost],
    categories: &CategoryIndex,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for remote in posts {
        match reconcile_post(store, remote, categories, now).await {
            Ok(Decision::Create) => report.created += 1,
            Ok(Decision::Update { .. }) => report.updated += 1,
            Ok(Decision::Skip) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(remote_id = remote.remote_id, error = %e, "failed to reconcile post");
                report.failures.push(WriteFailure {
                    remote_id: remote.remote_id,
                    message: format!("{:#}", e),
                });
            }
        }
    }

    report
}
