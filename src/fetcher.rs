//! Content fetcher: the [`ContentSource`] seam and its WordPress REST
//! implementation.
//!
//! [`WordPressClient`] talks to a `wp-json/wp/v2` namespace:
//!
//! - `GET {base}/posts?page=N&per_page=M&status=..&orderby=modified&order=asc`
//! - `GET {base}/posts/{id}`
//! - `GET {base}/categories?page=N&per_page=100`
//!
//! Totals come from the `X-WP-Total` / `X-WP-TotalPages` headers when the
//! server sends them. A page past the end is an empty page, not an error.
//! Posts on a page are decoded one by one: a malformed record is returned
//! in [`PostPage::rejected`] and the rest of the page is kept.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately as [`FetchError::Fatal`]
//! - Network errors and timeouts → retry
//! - Backoff: base, 2×base, 4×base, ... (capped at 2^5 × base)
//!
//! After `max_retries` retries the last error is returned as
//! [`FetchError::Transient`].
//!
//! # Authentication
//!
//! Anonymous by default. When `WPSYNC_USERNAME` and `WPSYNC_APP_PASSWORD`
//! are both set, requests carry HTTP basic credentials (a WordPress
//! application password), which is needed for non-public statuses.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use wpsync_core::models::{RemoteCategory, RemotePost};

use crate::config::{RemoteConfig, MAX_PER_PAGE};
use crate::error::FetchError;

/// One page of remote posts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPage {
    pub posts: Vec<RemotePost>,
    /// Total posts matching the query, when the remote reports it.
    pub total: Option<u64>,
    /// Total pages at the requested page size, when the remote reports it.
    pub total_pages: Option<u32>,
    /// Records on this page that could not be decoded.
    pub rejected: Vec<RejectedPost>,
}

impl PostPage {
    /// Records the remote returned, decoded or not.
    pub fn len(&self) -> usize {
        self.posts.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record on a posts page that is not a usable post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPost {
    /// The record's `id`, when it has one.
    pub remote_id: Option<i64>,
    pub reason: String,
}

/// A remote content API the sync engine can pull from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one 1-based page of posts. A page past the end is empty.
    async fn fetch_posts(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError>;

    /// Fetch a single post. `Ok(None)` when the remote has no such post.
    async fn fetch_post(&self, remote_id: i64) -> Result<Option<RemotePost>, FetchError>;

    /// Fetch every category.
    async fn fetch_categories(&self) -> Result<Vec<RemoteCategory>, FetchError>;
}

const CATEGORY_PAGE_SIZE: u32 = 100;
const INVALID_PAGE_CODE: &str = "rest_post_invalid_page_number";

/// Credentials for HTTP basic auth.
#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    fn from_env() -> Option<Self> {
        let username = std::env::var("WPSYNC_USERNAME").ok()?;
        let password = std::env::var("WPSYNC_APP_PASSWORD").ok()?;
        if username.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

/// [`ContentSource`] backed by the WordPress REST API.
pub struct WordPressClient {
    http: reqwest::Client,
    base_url: String,
    statuses: String,
    max_retries: u32,
    retry_base: Duration,
    credentials: Option<Credentials>,
}

impl WordPressClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::fatal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            statuses: config.statuses.join(","),
            max_retries: config.max_retries,
            retry_base: Duration::from_secs(1),
            credentials: Credentials::from_env(),
        })
    }

    /// Override the first backoff delay. Later delays double from it.
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a GET with retry/backoff and return the successful response.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.get(&url).query(query);
            if let Some(creds) = &self.credentials {
                request = request.basic_auth(&creds.username, Some(&creds.password));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let message = describe_error(status, &body_text);

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        tracing::debug!(%url, attempt, %status, "retryable response");
                        last_err = Some(FetchError::transient(message));
                        continue;
                    }

                    return Err(FetchError::fatal(message));
                }
                Err(e) => {
                    let err = FetchError::from_reqwest(&e);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    tracing::debug!(%url, attempt, error = %e, "request failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| FetchError::transient(format!("GET {} failed after retries", url))))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(T, HeaderMap), FetchError> {
        let response = self.get(path, query).await?;
        let headers = response.headers().clone();
        let body = response
            .json::<T>()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        Ok((body, headers))
    }
}

#[async_trait]
impl ContentSource for WordPressClient {
    async fn fetch_posts(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError> {
        let query = [
            ("page", page.max(1).to_string()),
            ("per_page", per_page.clamp(1, MAX_PER_PAGE).to_string()),
            ("status", self.statuses.clone()),
            ("orderby", "modified".to_string()),
            ("order", "asc".to_string()),
        ];

        let page_result: Result<(Vec<serde_json::Value>, HeaderMap), _> =
            self.get_json("/posts", &query).await;
        let (wire, headers) = match page_result {
            Ok(ok) => ok,
            Err(FetchError::Fatal(message)) if message.contains(INVALID_PAGE_CODE) => {
                return Ok(PostPage::default());
            }
            Err(e) => return Err(e),
        };

        let (posts, rejected) = decode_posts(wire);

        Ok(PostPage {
            posts,
            total: header_number(&headers, "x-wp-total"),
            total_pages: header_number(&headers, "x-wp-totalpages"),
            rejected,
        })
    }

    async fn fetch_post(&self, remote_id: i64) -> Result<Option<RemotePost>, FetchError> {
        let path = format!("/posts/{}", remote_id);
        let response = match self.get(&path, &[]).await {
            Ok(response) => response,
            Err(FetchError::Fatal(message)) if message.starts_with("HTTP 404") => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let wire: WpPost = response
            .json()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        wire.into_remote()
            .map(Some)
            .map_err(|reason| FetchError::fatal(format!("post {}: {}", remote_id, reason)))
    }

    async fn fetch_categories(&self) -> Result<Vec<RemoteCategory>, FetchError> {
        let mut categories = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("page", page.to_string()),
                ("per_page", CATEGORY_PAGE_SIZE.to_string()),
            ];
            let (wire, headers): (Vec<WpCategory>, _) =
                match self.get_json("/categories", &query).await {
                    Ok(ok) => ok,
                    Err(FetchError::Fatal(message)) if message.contains("invalid_page_number") => {
                        break;
                    }
                    Err(e) => return Err(e),
                };

            let count = wire.len() as u32;
            categories.extend(wire.into_iter().map(WpCategory::into_remote));

            let last_page = match header_number::<u32>(&headers, "x-wp-totalpages") {
                Some(total_pages) => page >= total_pages,
                None => count < CATEGORY_PAGE_SIZE,
            };
            if last_page || count == 0 {
                break;
            }
            page += 1;
        }

        Ok(categories)
    }
}

/// Decode each record of a posts page on its own.
fn decode_posts(records: Vec<serde_json::Value>) -> (Vec<RemotePost>, Vec<RejectedPost>) {
    let mut posts = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for record in records {
        let remote_id = record.get("id").and_then(serde_json::Value::as_i64);
        let decoded = serde_json::from_value::<WpPost>(record)
            .map_err(|e| format!("undecodable post: {}", e))
            .and_then(WpPost::into_remote);
        match decoded {
            Ok(post) => posts.push(post),
            Err(reason) => {
                tracing::warn!(remote_id, %reason, "skipping malformed post");
                rejected.push(RejectedPost { remote_id, reason });
            }
        }
    }

    (posts, rejected)
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Render a non-success response as `HTTP <code>: <wp code>: <message>`.
fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<WpErrorBody>(body) {
        Ok(err) => format!("HTTP {}: {}: {}", status.as_u16(), err.code, err.message),
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status.as_u16()),
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {}: {}", status.as_u16(), snippet.trim())
        }
    }
}

// ─── Wire format ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WpErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct WpRendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: i64,
    #[serde(default)]
    date_gmt: Option<String>,
    modified_gmt: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    title: WpRendered,
    #[serde(default)]
    content: WpRendered,
    #[serde(default)]
    excerpt: WpRendered,
    #[serde(default)]
    author: i64,
    #[serde(default)]
    categories: Vec<i64>,
}

impl WpPost {
    fn into_remote(self) -> Result<RemotePost, String> {
        let modified_at = parse_gmt(&self.modified_gmt)
            .ok_or_else(|| format!("invalid modified_gmt '{}'", self.modified_gmt))?;
        // Drafts report a null or zeroed date_gmt.
        let published_at = self.date_gmt.as_deref().and_then(parse_gmt);

        Ok(RemotePost {
            remote_id: self.id,
            title: self.title.rendered,
            body: self.content.rendered,
            excerpt: self.excerpt.rendered,
            status: self.status,
            slug: self.slug,
            link: self.link.filter(|l| !l.is_empty()),
            published_at,
            modified_at,
            category_ids: self.categories,
            author_id: self.author,
        })
    }
}

/// WordPress `*_gmt` fields are naive ISO-8601 timestamps in UTC.
fn parse_gmt(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .filter(|dt| dt.and_utc().timestamp() > 0)
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Deserialize)]
struct WpCategory {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    count: i64,
}

impl WpCategory {
    fn into_remote(self) -> RemoteCategory {
        RemoteCategory {
            id: self.id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            post_count: self.count,
        }
    }
}
