//! Fake WordPress REST API and fixtures shared by the integration tests.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use wpsync::config::{Config, DbConfig, RemoteConfig, ScheduleConfig, ServerConfig};
use wpsync::sqlite_store::SqliteStore;

/// In-process stand-in for `/wp-json/wp/v2`.
#[derive(Default)]
pub struct FakeWordPress {
    pub posts: Mutex<Vec<Value>>,
    pub categories: Mutex<Vec<Value>>,
    /// Pages answering 503.
    pub failing_pages: Mutex<HashSet<u32>>,
    /// Delay applied to every posts page, in milliseconds.
    pub delay_ms: Mutex<u64>,
    /// Raw query strings of every `/posts` page request.
    pub queries: Mutex<Vec<String>>,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap()
}

pub fn wp_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A post as WordPress renders it, modified `minutes` after [`base_time`].
pub fn wp_post(id: i64, title: &str, minutes: i64) -> Value {
    let modified = base_time() + Duration::minutes(minutes);
    json!({
        "id": id,
        "date_gmt": wp_time(base_time()),
        "modified_gmt": wp_time(modified),
        "slug": format!("post-{}", id),
        "status": "publish",
        "link": format!("https://horror.example.com/post-{}/", id),
        "title": {"rendered": title},
        "content": {"rendered": format!(
            "<!-- wp:paragraph --><p>Body of {} &amp; more.</p><!-- /wp:paragraph --><script>track()</script>",
            title
        )},
        "excerpt": {"rendered": format!("<p>{}&#8230;</p>", title)},
        "author": 3,
        "categories": [5, 9, 404]
    })
}

impl FakeWordPress {
    pub fn with_posts(count: i64) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut posts = fake.posts.lock().unwrap();
            for id in 1..=count {
                posts.push(wp_post(id, &format!("Tale {}", id), id));
            }
            let mut categories = fake.categories.lock().unwrap();
            categories.push(json!({"id": 5, "name": "Creature Feature", "slug": "creature", "description": "", "count": 2}));
            categories.push(json!({"id": 9, "name": "Slow &amp; Dread", "slug": "slow-dread", "description": "", "count": 1}));
        }
        Arc::new(fake)
    }

    pub fn fail_page(&self, page: u32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn heal(&self) {
        self.failing_pages.lock().unwrap().clear();
    }

    /// Replace the post with `id` by a newer revision titled `title`.
    pub fn edit(&self, id: i64, title: &str, minutes: i64) {
        let mut posts = self.posts.lock().unwrap();
        if let Some(slot) = posts.iter_mut().find(|p| p["id"] == json!(id)) {
            *slot = wp_post(id, title, minutes);
        }
    }

    /// Overwrite the raw `modified_gmt` of the post with `id`.
    pub fn set_modified(&self, id: i64, modified_gmt: &str) {
        let mut posts = self.posts.lock().unwrap();
        if let Some(slot) = posts.iter_mut().find(|p| p["id"] == json!(id)) {
            slot["modified_gmt"] = json!(modified_gmt);
        }
    }

    /// Serve on an ephemeral port; returns the REST base URL.
    pub async fn serve(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/wp-json/wp/v2/posts", get(list_posts))
            .route("/wp-json/wp/v2/posts/{id}", get(get_post))
            .route("/wp-json/wp/v2/categories", get(list_categories))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/wp-json/wp/v2", addr)
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

fn wp_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"code": code, "message": message, "data": {"status": status.as_u16()}})),
    )
        .into_response()
}

fn paged(items: Vec<Value>, page: u32, per_page: u32, invalid_code: &str) -> Response {
    let total = items.len() as u32;
    let total_pages = total.div_ceil(per_page).max(1);
    if page > total_pages {
        return wp_error(
            StatusCode::BAD_REQUEST,
            invalid_code,
            "The page number requested is larger than the number of pages available.",
        );
    }

    let start = ((page - 1) * per_page) as usize;
    let slice: Vec<Value> = items
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();

    let mut headers = HeaderMap::new();
    headers.insert("X-WP-Total", HeaderValue::from(total));
    headers.insert("X-WP-TotalPages", HeaderValue::from(total_pages));
    (headers, Json(slice)).into_response()
}

async fn list_posts(
    State(fake): State<Arc<FakeWordPress>>,
    Query(query): Query<PageQuery>,
    uri: axum::http::Uri,
) -> Response {
    fake.queries
        .lock()
        .unwrap()
        .push(uri.query().unwrap_or_default().to_string());

    let delay = *fake.delay_ms.lock().unwrap();
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let page = query.page.unwrap_or(1);
    if fake.failing_pages.lock().unwrap().contains(&page) {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream overloaded").into_response();
    }

    let mut posts = fake.posts.lock().unwrap().clone();
    posts.sort_by(|a, b| {
        a["modified_gmt"]
            .as_str()
            .cmp(&b["modified_gmt"].as_str())
    });
    paged(
        posts,
        page,
        query.per_page.unwrap_or(10),
        "rest_post_invalid_page_number",
    )
}

async fn get_post(State(fake): State<Arc<FakeWordPress>>, Path(id): Path<i64>) -> Response {
    let posts = fake.posts.lock().unwrap();
    match posts.iter().find(|p| p["id"] == json!(id)) {
        Some(post) => Json(post.clone()).into_response(),
        None => wp_error(StatusCode::NOT_FOUND, "rest_post_invalid_id", "Invalid post ID."),
    }
}

async fn list_categories(
    State(fake): State<Arc<FakeWordPress>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let categories = fake.categories.lock().unwrap().clone();
    paged(
        categories,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(10),
        "rest_invalid_page_number",
    )
}

/// A config pointing at `base_url` with a database inside `tmp`.
pub fn test_config(tmp: &TempDir, base_url: &str) -> Config {
    let mut remote = RemoteConfig::new(base_url);
    remote.max_retries = 1;
    remote.timeout_secs = 5;
    Config {
        db: DbConfig {
            path: tmp.path().join("data/wpsync.sqlite"),
        },
        remote,
        schedule: ScheduleConfig::default(),
        server: ServerConfig::default(),
    }
}

pub async fn open_store(config: &Config) -> SqliteStore {
    let pool = wpsync::db::connect(config).await.unwrap();
    wpsync::migrate::migrate_pool(&pool).await.unwrap();
    SqliteStore::new(pool)
}
