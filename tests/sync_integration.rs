//! End-to-end sync tests: real WordPress client against a fake REST API,
//! reconciling into a SQLite database in a temp directory.

mod common;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{base_time, open_store, test_config, FakeWordPress};
use wpsync::clock::{Clock, ManualClock, SystemClock};
use wpsync::error::SyncError;
use wpsync::fetcher::WordPressClient;
use wpsync::models::{LocalPost, ModerationFlags, NewPost, PostFields, SyncState};
use wpsync::sqlite_store::SqliteStore;
use wpsync::sync::SyncEngine;
use wpsync::tracker::SyncTracker;
use wpsync_core::store::memory::InMemoryStore;
use wpsync_core::store::{PostStore, RunLog};

struct Harness {
    _tmp: TempDir,
    fake: Arc<FakeWordPress>,
    store: Arc<SqliteStore>,
    engine: Arc<SyncEngine>,
}

async fn harness(posts: i64, per_page: u32) -> Harness {
    let fake = FakeWordPress::with_posts(posts);
    let base_url = fake.serve().await;
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &base_url);

    let store = Arc::new(open_store(&config).await);
    let client = WordPressClient::new(&config.remote)
        .unwrap()
        .with_retry_base(Duration::from_millis(1));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = SyncEngine::new(Arc::new(client), store.clone(), clock)
        .with_run_log(store.clone())
        .with_page_size(per_page);

    Harness {
        _tmp: tmp,
        fake,
        store,
        engine: Arc::new(engine),
    }
}

#[tokio::test]
async fn full_sync_mirrors_and_cleans_posts() {
    let h = harness(3, 50).await;

    let result = h.engine.sync_posts().await.unwrap();
    assert!(result.success);
    assert_eq!(result.state, SyncState::Succeeded);
    assert_eq!(result.created, 3);
    assert_eq!(result.posts_imported, 3);
    assert_eq!(result.total_posts, 3);

    let post = h.store.get(2).await.unwrap().unwrap();
    assert_eq!(post.fields.title, "Tale 2");
    assert_eq!(post.fields.body, "<p>Body of Tale 2 &amp; more.</p>");
    assert_eq!(post.fields.excerpt, "Tale 2\u{2026}");
    assert_eq!(
        post.fields.categories,
        vec!["Creature Feature".to_string(), "Slow & Dread".to_string()]
    );
    assert_eq!(post.updated_at(), base_time() + chrono::Duration::minutes(2));

    let queries = h.fake.queries.lock().unwrap().clone();
    assert!(queries[0].contains("orderby=modified"));
    assert!(queries[0].contains("status=publish"));
    assert!(queries[0].contains("per_page=50"));
}

#[tokio::test]
async fn second_sync_over_unchanged_remote_writes_nothing() {
    let h = harness(5, 2).await;

    let first = h.engine.sync_posts().await.unwrap();
    assert_eq!(first.created, 5);
    let before: Vec<LocalPost> = h.store.list().await.unwrap();

    let second = h.engine.sync_posts().await.unwrap();
    assert!(second.success);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 5);
    assert_eq!(second.posts_imported, 0);
    assert_eq!(second.total_posts, 5);

    let after = h.store.list().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn fractional_modified_time_is_stable_across_cycles() {
    let h = harness(2, 50).await;
    h.fake.set_modified(1, "2024-10-01T00:00:20.500Z");

    let first = h.engine.sync_posts().await.unwrap();
    assert_eq!(first.created, 2);
    let stored = h.store.get(1).await.unwrap().unwrap();
    assert_eq!(
        stored.updated_at(),
        base_time() + chrono::Duration::milliseconds(20_500)
    );

    let second = h.engine.sync_posts().await.unwrap();
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(h.store.get(1).await.unwrap().unwrap(), stored);
}

#[tokio::test]
async fn malformed_post_is_skipped_and_cycle_is_partial() {
    let h = harness(10, 50).await;
    h.fake.set_modified(10, "not-a-date");

    let result = h.engine.sync_posts().await.unwrap();
    assert_eq!(result.state, SyncState::Partial);
    assert_eq!(result.posts_imported, 9);
    assert_eq!(result.failed, 1);
    assert_eq!(result.total_posts, 10);
    let error = result.error.unwrap();
    assert!(error.contains("post 10"), "{}", error);
    assert!(error.contains("not-a-date"), "{}", error);

    assert_eq!(h.store.list().await.unwrap().len(), 9);
    assert!(h.store.get(10).await.unwrap().is_none());
}

#[tokio::test]
async fn newer_revision_updates_and_keeps_moderation() {
    let h = harness(3, 50).await;
    h.engine.sync_posts().await.unwrap();

    h.store
        .set_moderation(
            1,
            &ModerationFlags {
                hidden: true,
                comments_locked: false,
            },
        )
        .await
        .unwrap();
    let original = h.store.get(1).await.unwrap().unwrap();

    // Same timestamp, different title: not newer, must be skipped.
    h.fake.edit(2, "Tale 2 (retitled)", 2);
    // Strictly newer revision.
    h.fake.edit(1, "Tale 1, Revised", 120);

    let result = h.engine.sync_posts().await.unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.skipped, 2);

    let revised = h.store.get(1).await.unwrap().unwrap();
    assert_eq!(revised.fields.title, "Tale 1, Revised");
    assert_eq!(revised.id, original.id);
    assert_eq!(revised.created_at, original.created_at);
    assert!(revised.moderation.hidden);

    assert_eq!(h.store.get(2).await.unwrap().unwrap().fields.title, "Tale 2");
}

#[tokio::test]
async fn page_two_failure_leaves_partial_cycle() {
    let h = harness(100, 50).await;
    h.fake.fail_page(2);

    let result = h.engine.sync_posts().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.state, SyncState::Partial);
    assert_eq!(result.posts_imported, 50);
    assert_eq!(result.total_posts, 100);

    let status = h.engine.status();
    assert_eq!(status.state, SyncState::Partial);
    assert_eq!(status.posts_imported, 50);
    assert_eq!(status.total_posts, 100);
    let last_error = status.last_error.unwrap();
    assert!(last_error.contains("page 2"), "{}", last_error);
    assert!(last_error.contains("503"), "{}", last_error);
    assert!(status.last_sync_time.is_some());

    assert_eq!(h.store.list().await.unwrap().len(), 50);
    assert_eq!(h.store.last_run().await.unwrap().unwrap().state, SyncState::Partial);

    // The next cycle picks up the rest.
    h.fake.heal();
    let retry = h.engine.sync_posts().await.unwrap();
    assert_eq!(retry.state, SyncState::Succeeded);
    assert_eq!(retry.created, 50);
    assert_eq!(retry.skipped, 50);
    assert_eq!(h.engine.status().last_error, None);
}

#[tokio::test]
async fn first_page_failure_fails_cycle() {
    let h = harness(10, 50).await;
    h.fake.fail_page(1);

    let result = h.engine.sync_posts().await.unwrap();
    assert_eq!(result.state, SyncState::Failed);
    assert!(!result.success);
    assert_eq!(result.posts_imported, 0);
    assert!(result.error.unwrap().contains("transient"));
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn exact_multiple_of_page_size_stops_at_reported_last_page() {
    let h = harness(4, 2).await;

    let result = h.engine.sync_posts().await.unwrap();
    assert_eq!(result.state, SyncState::Succeeded);
    assert_eq!(result.created, 4);
    // X-WP-TotalPages ends the loop without asking for page 3.
    assert_eq!(h.fake.queries.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn single_post_resync() {
    let h = harness(3, 50).await;

    let created = h.engine.sync_post(2).await.unwrap();
    assert!(created.success);
    assert_eq!(created.created, 1);
    assert_eq!(created.total_posts, 1);
    assert_eq!(h.store.list().await.unwrap().len(), 1);

    h.fake.edit(2, "Tale 2, Again", 90);
    let updated = h.engine.sync_post(2).await.unwrap();
    assert_eq!(updated.updated, 1);

    let missing = h.engine.sync_post(999).await.unwrap();
    assert_eq!(missing.state, SyncState::Failed);
    assert!(!missing.success);
    assert_eq!(missing.posts_imported, 0);
    assert!(missing.error.unwrap().contains("404"));
    assert_eq!(h.engine.status().state, SyncState::Failed);
}

#[tokio::test]
async fn concurrent_request_is_rejected_while_syncing() {
    let h = harness(3, 50).await;
    h.engine.sync_posts().await.unwrap();
    let settled = h.engine.status();

    *h.fake.delay_ms.lock().unwrap() = 300;
    let engine = h.engine.clone();
    let running = tokio::spawn(async move { engine.sync_posts().await });

    for _ in 0..200 {
        if h.engine.status().is_syncing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let during = h.engine.status();
    assert!(during.is_syncing());

    assert!(matches!(
        h.engine.sync_posts().await,
        Err(SyncError::AlreadyInProgress)
    ));
    assert!(matches!(
        h.engine.sync_post(1).await,
        Err(SyncError::AlreadyInProgress)
    ));

    let during_after = h.engine.status();
    assert_eq!(during_after, during);
    assert_eq!(during_after.posts_imported, settled.posts_imported);
    assert_eq!(during_after.last_sync_time, settled.last_sync_time);

    let finished = running.await.unwrap().unwrap();
    assert!(finished.success);
    assert_eq!(h.engine.status().state, SyncState::Succeeded);
}

/// Wraps a store and fails every insert for one remote id.
struct FailingInsert {
    inner: InMemoryStore,
    poisoned: i64,
}

#[async_trait]
impl PostStore for FailingInsert {
    async fn get(&self, remote_id: i64) -> Result<Option<LocalPost>> {
        self.inner.get(remote_id).await
    }

    async fn insert(&self, post: &NewPost) -> Result<i64> {
        if post.remote_id == self.poisoned {
            bail!("disk I/O error");
        }
        self.inner.insert(post).await
    }

    async fn update(&self, id: i64, fields: &PostFields) -> Result<()> {
        self.inner.update(id, fields).await
    }

    async fn list(&self) -> Result<Vec<LocalPost>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn write_failure_is_isolated_to_one_post() {
    let fake = FakeWordPress::with_posts(10);
    let base_url = fake.serve().await;
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &base_url);

    let store = Arc::new(FailingInsert {
        inner: InMemoryStore::new(),
        poisoned: 5,
    });
    let clock = Arc::new(ManualClock::new(base_time()));
    let client = WordPressClient::new(&config.remote).unwrap();
    let engine = SyncEngine::new(Arc::new(client), store.clone(), clock);

    let result = engine.sync_posts().await.unwrap();
    assert_eq!(result.state, SyncState::Partial);
    assert_eq!(result.created + result.updated, 9);
    assert_eq!(result.failed, 1);
    let error = result.error.unwrap();
    assert!(error.contains("post 5"), "{}", error);
    assert!(error.contains("disk I/O error"), "{}", error);

    assert!(store.get(5).await.unwrap().is_none());
    assert!(store.get(6).await.unwrap().is_some());
    assert_eq!(store.list().await.unwrap().len(), 9);
}

#[tokio::test]
async fn tracker_resumes_from_run_log() {
    let h = harness(2, 50).await;
    h.fake.fail_page(1);
    h.engine.sync_posts().await.unwrap();

    let last = h.store.last_run().await.unwrap().unwrap();
    assert_eq!(last.state, SyncState::Failed);

    let tracker = SyncTracker::with_status(Arc::new(SystemClock), last.clone());
    assert_eq!(tracker.status(), last);
}
