//! Typed errors for fetching and sync admission.
//!
//! Application edges (config, CLI, migrations) use `anyhow`; the sync path
//! uses these enums because callers branch on the variant: transient fetch
//! failures may be retried, fatal ones must not, and an admission
//! rejection is not a cycle failure at all.

use thiserror::Error;

/// Errors from the remote content API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, timeout, HTTP 429 or 5xx. Retrying may succeed.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// HTTP 4xx (bad request, auth, not found) or an undecodable payload.
    /// Retrying the same request will fail the same way.
    #[error("fatal fetch error: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a `reqwest` transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                Self::fatal(err.to_string())
            }
            // A body that is not the JSON we expect will not improve on retry.
            _ if err.is_decode() => Self::fatal(err.to_string()),
            _ => Self::transient(err.to_string()),
        }
    }
}

/// Errors surfaced by the sync entry points.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another cycle is in flight. Status was not touched.
    #[error("a sync is already in progress")]
    AlreadyInProgress,

    /// The cycle could not fetch anything it needed from the remote.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Writing a single post failed (single-post resync only; full cycles
    /// isolate these per post).
    #[error("failed to write post {remote_id}: {message}")]
    ReconciliationWrite { remote_id: i64, message: String },

    /// The task running the cycle panicked. The tracker has already
    /// recorded the cycle as failed.
    #[error("sync task ended abnormally: {0}")]
    Interrupted(String),
}
