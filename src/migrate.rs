use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Mirrored posts. remote_id is the reconciliation key; id is local.
    // Timestamps here and in sync_runs are Unix microseconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            excerpt TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            slug TEXT NOT NULL DEFAULT '',
            link TEXT,
            published_at INTEGER,
            categories_json TEXT NOT NULL DEFAULT '[]',
            author_id INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            synced_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            hidden INTEGER NOT NULL DEFAULT 0,
            comments_locked INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Completed sync cycles, newest last.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state TEXT NOT NULL,
            finished_at INTEGER,
            last_error TEXT,
            posts_imported INTEGER NOT NULL,
            total_posts INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_updated_at ON posts(updated_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status)")
        .execute(pool)
        .await?;

    Ok(())
}
