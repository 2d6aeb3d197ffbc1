//! Time sources for the refresh schedule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;

/// Source of "now" and of TTL sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
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

/// Clock that only moves when told to.
///
/// Sleepers wake once [`ManualClock::advance`] has moved time to or past
/// their deadline. Tests should wait for [`ManualClock::wait_for_sleepers`]
/// before advancing, otherwise the deadline may be taken after the jump.
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<DateTime<Utc>>,
    sleepers: watch::Sender<usize>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        let (sleepers, _) = watch::channel(0);
        Self { now, sleepers }
    }

    /// Number of tasks currently blocked in `sleep`.
    pub fn sleepers(&self) -> usize {
        *self.sleepers.borrow()
    }

    pub async fn wait_for_sleepers(&self, count: usize) {
        let mut rx = self.sleepers.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| {
            if let Some(later) = offset(*now, by) {
                *now = later;
            }
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let Some(deadline) = offset(self.now(), duration) else {
            return std::future::pending().await;
        };
        let mut rx = self.now.subscribe();
        let _registered = SleeperGuard::new(&self.sleepers);
        // The sender lives as long as `self`, so this only returns at the deadline.
        let _ = rx.wait_for(|now| *now >= deadline).await;
    }
}

struct SleeperGuard<'a>(&'a watch::Sender<usize>);

impl<'a> SleeperGuard<'a> {
    fn new(sleepers: &'a watch::Sender<usize>) -> Self {
        sleepers.send_modify(|n| *n += 1);
        Self(sleepers)
    }
}

impl Drop for SleeperGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

fn offset(at: DateTime<Utc>, by: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
}
