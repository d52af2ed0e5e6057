//! Sync progress on stderr.
//!
//! `wpsync sync` reports each page request and a running post count so a
//! long first import is not silent. Output goes to stderr; stdout is left
//! for the final summary, which scripts may parse.
//!
//! Human lines look like `sync  page 3 / 12` and
//! `sync  reconciled  150 / 600 posts`; JSON mode prints one object per
//! line with an `event` and a `phase`.

use std::io::Write;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum SyncProgressEvent {
    /// About to request `page`. `total_pages` is known once the remote has
    /// answered at least one page with `X-WP-TotalPages`.
    FetchingPage { page: u32, total_pages: Option<u32> },
    /// `n` of `total` posts have been through reconciliation.
    Reconciling { n: u64, total: u64 },
}

impl SyncProgressEvent {
    pub fn phase(&self) -> &'static str {
        match self {
            SyncProgressEvent::FetchingPage { .. } => "fetching",
            SyncProgressEvent::Reconciling { .. } => "reconciling",
        }
    }
}

/// Sink for progress events. Called from the sync engine between pages.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

fn write_stderr(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", line);
    let _ = err.flush();
}

pub struct HumanProgress;

impl ProgressReporter for HumanProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match event {
            SyncProgressEvent::FetchingPage {
                page,
                total_pages: Some(total),
            } => format!("sync  page {} / {}", page, total),
            SyncProgressEvent::FetchingPage { page, .. } => format!("sync  page {}", page),
            SyncProgressEvent::Reconciling { n, total } => format!(
                "sync  reconciled  {} / {} posts",
                format_number(n),
                format_number(total)
            ),
        };
        write_stderr(&line);
    }
}

pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let mut obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase(),
        });
        match event {
            SyncProgressEvent::FetchingPage { page, total_pages } => {
                obj["page"] = page.into();
                obj["total_pages"] = total_pages.into();
            }
            SyncProgressEvent::Reconciling { n, total } => {
                obj["n"] = n.into();
                obj["total"] = total.into();
            }
        }
        write_stderr(&obj.to_string());
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Which reporter the CLI should use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human output on an interactive stderr, nothing otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(HumanProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
