//! Periodic sync scheduler.
//!
//! One background task per running schedule fires a full cycle at a fixed
//! rate on the injected [`Clock`]: firings land on `start + k * interval`
//! whatever each cycle took, and firings missed while a cycle overran are
//! skipped rather than queued. Stopping only prevents the next firing; a
//! cycle already in flight runs to completion.
//!
//! ```text
//!   stopped ──start(interval)──▶ running ──stop()──▶ stopped
//!                                   │  ▲
//!                                   └──┘ start(other) restarts the loop
//! ```
//!
//! Out-of-band cycles go through [`Scheduler::sync_now`] and share the
//! engine's single-flight guard with the ticks. They run on their own task,
//! so a caller that stops waiting does not cancel a started cycle.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use wpsync_core::models::SyncResult;

use crate::clock::Clock;
use crate::error::SyncError;
use crate::sync::SyncEngine;

/// What an out-of-band sync should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    All,
    Post(i64),
}

struct Running {
    interval: Duration,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    clock: Arc<dyn Clock>,
    run_on_start: bool,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            run_on_start: false,
            running: Mutex::new(None),
        }
    }

    /// Fire one cycle as soon as the schedule starts, before the first sleep.
    pub fn run_on_start(mut self, yes: bool) -> Self {
        self.run_on_start = yes;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start firing a full cycle every `interval`. Restarts the loop when
    /// already running. Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) {
        let mut running = self.lock();
        if let Some(previous) = running.take() {
            tracing::info!(
                old_ms = previous.interval.as_millis() as u64,
                new_ms = interval.as_millis() as u64,
                "restarting sync schedule"
            );
            let _ = previous.stop.send(true);
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.engine.clone(),
            self.clock.clone(),
            interval,
            self.run_on_start,
            stop_rx,
        ));

        tracing::info!(interval_ms = interval.as_millis() as u64, "sync schedule started");
        *running = Some(Running {
            interval,
            stop,
            handle,
        });
    }

    /// Prevent further firings. Does not wait for an in-flight cycle.
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            let _ = running.stop.send(true);
            tracing::info!("sync schedule stopped");
        }
    }

    /// Stop and wait for the loop task (and any in-flight cycle) to end.
    pub async fn shutdown(&self) {
        let running = self.lock().take();
        if let Some(running) = running {
            let _ = running.stop.send(true);
            if let Err(e) = running.handle.await {
                tracing::warn!(error = %e, "sync schedule task ended abnormally");
            }
            tracing::info!("sync schedule shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn interval(&self) -> Option<Duration> {
        self.lock().as_ref().map(|running| running.interval)
    }

    /// Run a cycle now, outside the schedule. Does not reset the timer.
    ///
    /// The cycle is detached: dropping the returned future stops the wait,
    /// not the cycle.
    pub async fn sync_now(&self, target: SyncTarget) -> Result<SyncResult, SyncError> {
        let engine = self.engine.clone();
        let cycle = tokio::spawn(async move {
            match target {
                SyncTarget::All => engine.sync_posts().await,
                SyncTarget::Post(remote_id) => engine.sync_post(remote_id).await,
            }
        });
        cycle
            .await
            .map_err(|e| SyncError::Interrupted(e.to_string()))?
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            let _ = running.stop.send(true);
        }
    }
}

/// Fixed-rate firing times.
struct Cadence {
    next: DateTime<Utc>,
    step: TimeDelta,
}

impl Cadence {
    fn new(start: DateTime<Utc>, interval: Duration) -> Self {
        let step = TimeDelta::from_std(interval)
            .unwrap_or(TimeDelta::MAX)
            .max(TimeDelta::milliseconds(1));
        Self {
            next: start.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC),
            step,
        }
    }

    /// Move past every firing at or before `now` and return the wait until
    /// the next one.
    fn wait_from(&mut self, now: DateTime<Utc>) -> Duration {
        if self.next <= now {
            let behind = (now - self.next).num_milliseconds();
            let missed = behind / self.step.num_milliseconds().max(1) + 1;
            self.next = i32::try_from(missed)
                .ok()
                .and_then(|k| self.step.checked_mul(k))
                .and_then(|jump| self.next.checked_add_signed(jump))
                .filter(|next| *next > now)
                .or_else(|| now.checked_add_signed(self.step))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
        (self.next - now).to_std().unwrap_or(Duration::ZERO)
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    run_first: bool,
    mut stop: watch::Receiver<bool>,
) {
    let mut cadence = Cadence::new(clock.now(), interval);
    if run_first {
        tick(&engine).await;
    }

    loop {
        let wait = cadence.wait_from(clock.now());
        tokio::select! {
            biased;
            changed = stop.changed() => {
                // Sender dropped counts as a stop.
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = clock.sleep(wait) => {}
        }

        if *stop.borrow() {
            break;
        }
        tick(&engine).await;
    }

    tracing::debug!("sync schedule loop exited");
}

async fn tick(engine: &SyncEngine) {
    match engine.sync_posts().await {
        Ok(result) => tracing::debug!(state = %result.state, "scheduled sync done"),
        Err(SyncError::AlreadyInProgress) => {
            tracing::info!("scheduled sync skipped, another cycle is in progress")
        }
        Err(e) => tracing::warn!(error = %e, "scheduled sync failed"),
    }
}
