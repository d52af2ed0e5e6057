//! SQLite-backed [`PostStore`] and [`RunLog`] implementation.
//!
//! Maps each store operation to a single SQL statement against the
//! `posts` and `sync_runs` tables created by [`crate::migrate`]. Every
//! statement runs on its own pooled connection and commits on its own, so
//! a write never holds a lock beyond the row it touches.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use wpsync_core::models::{
    LocalPost, ModerationFlags, NewPost, PostFields, SyncState, SyncStatus,
};
use wpsync_core::store::{PostStore, RunLog};

/// SQLite implementation of [`PostStore`] and [`RunLog`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Set local moderation flags. Owned by the moderation subsystem;
    /// exposed here so tools and tests can exercise preservation.
    pub async fn set_moderation(&self, remote_id: i64, flags: &ModerationFlags) -> Result<()> {
        let result = sqlx::query(
            "UPDATE posts SET hidden = ?, comments_locked = ? WHERE remote_id = ?",
        )
        .bind(flags.hidden)
        .bind(flags.comments_locked)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("post with remote id {} not found", remote_id);
        }
        Ok(())
    }
}

// Timestamp columns hold Unix microseconds so remote `modified` values
// compare equal after a round trip.
fn from_ts(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("timestamp out of range: {}", micros))
}

fn row_to_post(row: &SqliteRow) -> Result<LocalPost> {
    let categories_json: String = row.try_get("categories_json")?;
    let categories: Vec<String> = serde_json::from_str(&categories_json)
        .with_context(|| format!("invalid categories_json: {}", categories_json))?;
    let published_at: Option<i64> = row.try_get("published_at")?;

    Ok(LocalPost {
        id: row.try_get("id")?,
        remote_id: row.try_get("remote_id")?,
        fields: PostFields {
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            excerpt: row.try_get("excerpt")?,
            status: row.try_get("status")?,
            slug: row.try_get("slug")?,
            link: row.try_get("link")?,
            published_at: published_at.map(from_ts).transpose()?,
            categories,
            author_id: row.try_get("author_id")?,
            updated_at: from_ts(row.try_get("updated_at")?)?,
            synced_at: from_ts(row.try_get("synced_at")?)?,
        },
        moderation: ModerationFlags {
            hidden: row.try_get("hidden")?,
            comments_locked: row.try_get("comments_locked")?,
        },
        created_at: from_ts(row.try_get("created_at")?)?,
    })
}

const POST_COLUMNS: &str = "id, remote_id, title, body, excerpt, status, slug, link, \
     published_at, categories_json, author_id, updated_at, synced_at, created_at, \
     hidden, comments_locked";

#[async_trait]
impl PostStore for SqliteStore {
    async fn get(&self, remote_id: i64) -> Result<Option<LocalPost>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE remote_id = ?",
            POST_COLUMNS
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn insert(&self, post: &NewPost) -> Result<i64> {
        let f = &post.fields;
        let result = sqlx::query(
            r#"
            INSERT INTO posts (remote_id, title, body, excerpt, status, slug, link,
                               published_at, categories_json, author_id,
                               updated_at, synced_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.remote_id)
        .bind(&f.title)
        .bind(&f.body)
        .bind(&f.excerpt)
        .bind(&f.status)
        .bind(&f.slug)
        .bind(&f.link)
        .bind(f.published_at.map(|t| t.timestamp_micros()))
        .bind(serde_json::to_string(&f.categories)?)
        .bind(f.author_id)
        .bind(f.updated_at.timestamp_micros())
        .bind(f.synced_at.timestamp_micros())
        .bind(f.synced_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert of remote post {} failed", post.remote_id))?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, id: i64, fields: &PostFields) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET
                title = ?,
                body = ?,
                excerpt = ?,
                status = ?,
                slug = ?,
                link = ?,
                published_at = ?,
                categories_json = ?,
                author_id = ?,
                updated_at = ?,
                synced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.body)
        .bind(&fields.excerpt)
        .bind(&fields.status)
        .bind(&fields.slug)
        .bind(&fields.link)
        .bind(fields.published_at.map(|t| t.timestamp_micros()))
        .bind(serde_json::to_string(&fields.categories)?)
        .bind(fields.author_id)
        .bind(fields.updated_at.timestamp_micros())
        .bind(fields.synced_at.timestamp_micros())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("update of post {} failed", id))?;

        if result.rows_affected() == 0 {
            bail!("post {} not found", id);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<LocalPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts ORDER BY remote_id",
            POST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_post).collect()
    }
}

#[async_trait]
impl RunLog for SqliteStore {
    async fn record_run(&self, status: &SyncStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (state, finished_at, last_error, posts_imported, total_posts)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(status.state.as_str())
        .bind(status.last_sync_time.map(|t| t.timestamp_micros()))
        .bind(&status.last_error)
        .bind(status.posts_imported as i64)
        .bind(status.total_posts as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_run(&self) -> Result<Option<SyncStatus>> {
        let row = sqlx::query(
            r#"
            SELECT state, finished_at, last_error, posts_imported, total_posts
            FROM sync_runs
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state: String = row.try_get("state")?;
        let finished_at: Option<i64> = row.try_get("finished_at")?;
        let posts_imported: i64 = row.try_get("posts_imported")?;
        let total_posts: i64 = row.try_get("total_posts")?;

        Ok(Some(SyncStatus {
            state: SyncState::parse(&state)
                .ok_or_else(|| anyhow!("unknown sync state in run log: {}", state))?,
            last_sync_time: finished_at.map(from_ts).transpose()?,
            last_error: row.try_get("last_error")?,
            posts_imported: posts_imported.max(0) as u64,
            total_posts: total_posts.max(0) as u64,
        }))
    }
}
