//! The public cache facade.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::engine::{RefreshEngine, RefreshStatus};
use crate::fetcher::{ConfiguredFetcher, ObjectFetcher};
use crate::key::{BackendKind, CacheKey};
use crate::state::{CacheState, CachedValue};
use crate::transform::Transformer;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Builder for [`ThreadedObjectCache`].
pub struct CacheBuilder<T = Value> {
    config: CacheConfig,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    transformer: Transformer<T>,
    fetcher: Option<Arc<dyn ObjectFetcher>>,
    block_until_cached: bool,
}

impl CacheBuilder<Value> {
    pub fn new(backend: BackendKind, bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_config(&CacheConfig::new(backend, bucket, path))
    }

    /// Start from a loaded configuration, including its client settings.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            config: config.clone(),
            ttl: Duration::from_secs(config.ttl_seconds),
            clock: Arc::new(SystemClock),
            transformer: Transformer::identity(),
            fetcher: None,
            block_until_cached: config.block_until_cached,
        }
    }
}

impl<T: Send + Sync + 'static> CacheBuilder<T> {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_seconds(self, seconds: u64) -> Self {
        self.ttl(Duration::from_secs(seconds))
    }

    /// Replace the wall clock, e.g. with a `ManualClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the backend client built from the configuration.
    pub fn fetcher(mut self, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn block_until_cached(mut self, block: bool) -> Self {
        self.block_until_cached = block;
        self
    }

    /// Publish `transformer(document)` instead of the decoded document.
    pub fn transformer<U: Send + Sync + 'static>(
        self,
        transformer: Transformer<U>,
    ) -> CacheBuilder<U> {
        CacheBuilder {
            config: self.config,
            ttl: self.ttl,
            clock: self.clock,
            transformer,
            fetcher: self.fetcher,
            block_until_cached: self.block_until_cached,
        }
    }

    /// Validate the key, start the refresh thread and, if requested, wait
    /// for the first value.
    ///
    /// With `block_until_cached` this blocks the calling thread with no
    /// timeout; impose one externally if needed. Async callers should
    /// prefer [`ThreadedObjectCache::wait_until_cached`].
    pub fn build(self) -> Result<ThreadedObjectCache<T>> {
        let key = self.config.key()?;
        if self.ttl.is_zero() {
            return Err(Error::InvalidTtl);
        }

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ConfiguredFetcher::new(self.config.clone())),
        };

        let state = Arc::new(CacheState::new());
        let engine = RefreshEngine::new(
            key.clone(),
            self.ttl,
            fetcher,
            self.transformer,
            self.clock,
            Arc::clone(&state),
        );
        let status_rx = engine.status();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(format!("Failed to build refresh runtime: {}", e)))?;

        let worker = std::thread::Builder::new()
            .name("jsoncache-refresh".to_string())
            .spawn(move || runtime.block_on(engine.run(shutdown_rx)))
            .map_err(|e| Error::Runtime(format!("Failed to spawn refresh thread: {}", e)))?;

        info!(key = %key, ttl_secs = self.ttl.as_secs(), "Cache created");

        let cache = ThreadedObjectCache {
            key,
            ttl: self.ttl,
            state,
            status_rx,
            shutdown_tx,
            worker: Some(worker),
        };

        if self.block_until_cached {
            futures::executor::block_on(cache.wait_until_cached())?;
        }

        Ok(cache)
    }
}

/// Read-mostly cache of one remote JSON object, refreshed in the background.
///
/// `get` never blocks and never performs I/O: it returns the latest
/// successfully loaded value, or `None` if nothing has loaded yet. Refresh
/// failures are logged and otherwise invisible to readers.
pub struct ThreadedObjectCache<T = Value> {
    key: CacheKey,
    ttl: Duration,
    state: Arc<CacheState<T>>,
    status_rx: watch::Receiver<RefreshStatus>,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedObjectCache<Value> {
    pub fn builder(
        backend: BackendKind,
        bucket: impl Into<String>,
        path: impl Into<String>,
    ) -> CacheBuilder<Value> {
        CacheBuilder::new(backend, bucket, path)
    }
}

impl<T> ThreadedObjectCache<T> {
    /// The latest published value, or `None` before the first success.
    pub fn get(&self) -> Option<Arc<T>> {
        self.state.read().map(|cached| Arc::clone(&cached.value))
    }

    /// The latest published value with its version and fetch time.
    pub fn current(&self) -> Option<Arc<CachedValue<T>>> {
        self.state.read()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified after every engine state change and attempt.
    pub fn watch_status(&self) -> watch::Receiver<RefreshStatus> {
        self.status_rx.clone()
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Receiver that observes the published version (0 until the first success).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.subscribe()
    }

    /// Wait until a value has been published.
    ///
    /// Fails only if the refresh thread has gone away without publishing.
    pub async fn wait_until_cached(&self) -> Result<()> {
        let mut status = self.status_rx.clone();
        status
            .wait_for(|s| s.successes > 0)
            .await
            .map(|_| ())
            .map_err(|_| Error::Runtime("Refresh thread exited before caching a value".into()))
    }

    /// Ask the refresh thread to stop without waiting for it.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Stop the refresh thread and wait for it to exit.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop();
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| Error::Runtime("Refresh thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl<T> Drop for ThreadedObjectCache<T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
