//! Time source for the sync engine and scheduler.
//!
//! Production code uses [`SystemClock`]. [`ManualClock`] lets tests stamp
//! writes with a fixed time and fire scheduler ticks on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wait for `duration` to elapse on this clock.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to.
///
/// Each [`advance`](ManualClock::advance) releases exactly one pending or
/// future [`sleep`](Clock::sleep), whatever duration it asked for.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    wakeups: Semaphore,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            wakeups: Semaphore::new(0),
        }
    }

    /// Move time forward and release one sleeper.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            if let Ok(by) = chrono::Duration::from_std(by) {
                *now += by;
            }
        }
        self.wakeups.add_permits(1);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn sleep(&self, _duration: Duration) {
        if let Ok(permit) = self.wakeups.acquire().await {
            permit.forget();
        }
    }
}
