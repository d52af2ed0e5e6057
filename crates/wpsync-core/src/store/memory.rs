//! In-memory [`PostStore`] implementation for testing and embedding.
//!
//! Uses a `BTreeMap` keyed by remote id behind `std::sync::RwLock`, so
//! [`list`](PostStore::list) is naturally ordered. Local ids are assigned
//! from a counter starting at 1.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{LocalPost, ModerationFlags, NewPost, PostFields, SyncStatus};

use super::{PostStore, RunLog};

#[derive(Default)]
struct Inner {
    posts: BTreeMap<i64, LocalPost>,
    next_id: i64,
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    runs: RwLock<Vec<SyncStatus>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set moderation flags on a stored post (a stand-in for the
    /// moderation subsystem, which owns these fields).
    pub fn set_moderation(&self, remote_id: i64, flags: ModerationFlags) -> Result<()> {
        let mut inner = self.write()?;
        let post = inner
            .posts
            .get_mut(&remote_id)
            .ok_or_else(|| anyhow!("post with remote id {} not found", remote_id))?;
        post.moderation = flags;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.posts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All recorded runs, oldest first.
    pub fn runs(&self) -> Vec<SyncStatus> {
        self.runs.read().map(|r| r.clone()).unwrap_or_default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn get(&self, remote_id: i64) -> Result<Option<LocalPost>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(inner.posts.get(&remote_id).cloned())
    }

    async fn insert(&self, post: &NewPost) -> Result<i64> {
        let mut inner = self.write()?;
        if inner.posts.contains_key(&post.remote_id) {
            bail!("post with remote id {} already exists", post.remote_id);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.posts.insert(
            post.remote_id,
            LocalPost {
                id,
                remote_id: post.remote_id,
                fields: post.fields.clone(),
                moderation: ModerationFlags::default(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update(&self, id: i64, fields: &PostFields) -> Result<()> {
        let mut inner = self.write()?;
        let post = inner
            .posts
            .values_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("post {} not found", id))?;
        post.fields = fields.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<LocalPost>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(inner.posts.values().cloned().collect())
    }
}

#[async_trait]
impl RunLog for InMemoryStore {
    async fn record_run(&self, status: &SyncStatus) -> Result<()> {
        self.runs
            .write()
            .map_err(|_| anyhow!("in-memory run log lock poisoned"))?
            .push(status.clone());
        Ok(())
    }

    async fn last_run(&self) -> Result<Option<SyncStatus>> {
        Ok(self
            .runs
            .read()
            .map_err(|_| anyhow!("in-memory run log lock poisoned"))?
            .last()
            .cloned())
    }
}
