//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/wpsync.sqlite"
//!
//! [remote]
//! base_url = "https://horror.example.com/wp-json/wp/v2"
//! per_page = 50
//!
//! [schedule]
//! interval_ms = 900000
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Only `[db]` and `[remote].base_url` are required; everything else has a
//! default. [`load_config`] rejects values the sync engine cannot honour.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum `per_page` accepted by the WordPress REST API.
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// REST namespace root, e.g. `https://example.com/wp-json/wp/v2`.
    pub base_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on pages fetched per cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_per_page() -> u32 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_pages() -> u32 {
    500
}
fn default_statuses() -> Vec<String> {
    vec!["publish".to_string()]
}
fn default_user_agent() -> String {
    format!("wpsync/{}", env!("CARGO_PKG_VERSION"))
}

impl RemoteConfig {
    /// A config pointing at `base_url` with every other field defaulted.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_pages: default_max_pages(),
            statuses: default_statuses(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Interval between scheduled cycles. No background schedule when unset.
    #[serde(default)]
    pub interval_ms: Option<u64>,
    /// Run one cycle immediately when the schedule starts.
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

fn default_run_on_start() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_ms: None,
            run_on_start: default_run_on_start(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let remote = &config.remote;

    let url = reqwest::Url::parse(&remote.base_url)
        .with_context(|| format!("remote.base_url is not a valid URL: {}", remote.base_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("remote.base_url must be http or https, got '{}'", url.scheme());
    }

    if remote.per_page == 0 || remote.per_page > MAX_PER_PAGE {
        anyhow::bail!("remote.per_page must be in 1..={}", MAX_PER_PAGE);
    }

    if remote.timeout_secs == 0 {
        anyhow::bail!("remote.timeout_secs must be > 0");
    }

    if remote.max_pages == 0 {
        anyhow::bail!("remote.max_pages must be >= 1");
    }

    if remote.statuses.is_empty() {
        anyhow::bail!("remote.statuses must list at least one status");
    }

    if config.schedule.interval_ms == Some(0) {
        anyhow::bail!("schedule.interval_ms must be > 0");
    }

    Ok(())
}
