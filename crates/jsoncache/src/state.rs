//! The published value and its atomic holder.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// A successfully loaded payload.
#[derive(Debug)]
pub struct CachedValue<T> {
    pub value: Arc<T>,
    /// Starts at 1 and increases by one per publish.
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Single-writer, many-reader holder of the current value.
///
/// Reads are lock-free. Publishing swaps in a fully built value, then bumps
/// the version watched by anyone waiting for an update.
pub struct CacheState<T> {
    current: ArcSwapOption<CachedValue<T>>,
    version_tx: watch::Sender<u64>,
}

impl<T> CacheState<T> {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            current: ArcSwapOption::empty(),
            version_tx,
        }
    }

    pub fn read(&self) -> Option<Arc<CachedValue<T>>> {
        self.current.load_full()
    }

    /// Replace the current value and return what was published.
    pub fn publish(&self, value: T, fetched_at: DateTime<Utc>) -> Arc<CachedValue<T>> {
        let version = *self.version_tx.borrow() + 1;
        let cached = Arc::new(CachedValue {
            value: Arc::new(value),
            version,
            fetched_at,
        });
        self.current.store(Some(Arc::clone(&cached)));
        self.version_tx.send_replace(version);
        cached
    }

    pub fn version(&self) -> u64 {
        *self.version_tx.borrow()
    }

    /// Receiver that observes the version after each publish (0 = nothing yet).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self::new()
    }
}
