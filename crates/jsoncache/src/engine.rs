//! Background refresh loop.

use crate::Result;
use crate::clock::Clock;
use crate::decoder::{self, DecodeHint};
use crate::fetcher::ObjectFetcher;
use crate::key::CacheKey;
use crate::state::{CacheState, CachedValue};
use crate::transform::Transformer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Where the refresh loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Fetching,
    Sleeping,
    Stopped,
}

/// Diagnostic snapshot of the refresh loop.
#[derive(Debug, Clone)]
pub struct RefreshStatus {
    pub state: EngineState,
    /// Completed attempts, successful or not.
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            attempts: 0,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            last_error: None,
            last_attempt_at: None,
            last_success_at: None,
        }
    }
}

/// Fetch, decode, transform and publish on a fixed interval.
pub struct RefreshEngine<T> {
    key: CacheKey,
    ttl: Duration,
    fetcher: Arc<dyn ObjectFetcher>,
    transformer: Transformer<T>,
    clock: Arc<dyn Clock>,
    state: Arc<CacheState<T>>,
    status_tx: watch::Sender<RefreshStatus>,
}

impl<T: Send + Sync + 'static> RefreshEngine<T> {
    pub fn new(
        key: CacheKey,
        ttl: Duration,
        fetcher: Arc<dyn ObjectFetcher>,
        transformer: Transformer<T>,
        clock: Arc<dyn Clock>,
        state: Arc<CacheState<T>>,
    ) -> Self {
        let (status_tx, _) = watch::channel(RefreshStatus::default());
        Self {
            key,
            ttl,
            fetcher,
            transformer,
            clock,
            state,
            status_tx,
        }
    }

    pub fn status(&self) -> watch::Receiver<RefreshStatus> {
        self.status_tx.subscribe()
    }

    /// Run one fetch → decode → transform → publish pass.
    ///
    /// Nothing is published unless every stage succeeds.
    pub async fn refresh_once(&self) -> Result<Arc<CachedValue<T>>> {
        let fetched = self.fetcher.fetch(&self.key).await?;
        let hint = DecodeHint {
            content_encoding: fetched.content_encoding.as_deref(),
            path: Some(self.key.path()),
        };
        let decoded = decoder::decode(&fetched.body, hint)?;
        let value = self.transformer.apply(decoded)?;
        Ok(self.state.publish(value, self.clock.now()))
    }

    /// Loop until `shutdown` flips to `true` or its sender goes away.
    ///
    /// The first attempt starts immediately; each later one starts a full
    /// TTL after the previous attempt finished.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(key = %self.key, ttl_secs = self.ttl.as_secs(), "Refresh engine started");

        loop {
            self.set_state(EngineState::Fetching);
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                _ = self.attempt() => {}
            }

            self.set_state(EngineState::Sleeping);
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                _ = self.clock.sleep(self.ttl) => {}
            }
        }

        self.set_state(EngineState::Stopped);
        info!(key = %self.key, "Refresh engine stopped");
    }

    async fn attempt(&self) {
        let attempt = self.status_tx.borrow().attempts + 1;
        let start = Instant::now();
        debug!(key = %self.key, attempt, "Refreshing cached object");

        let outcome = self.refresh_once().await;
        let now = self.clock.now();

        match &outcome {
            Ok(published) => {
                info!(
                    key = %self.key,
                    attempt,
                    version = published.version,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Loaded {}",
                    self.key
                );
            }
            Err(e) => {
                error!(
                    backend = %self.key.backend(),
                    bucket = self.key.bucket(),
                    path = self.key.path(),
                    stage = %e.stage().map(|s| s.to_string()).unwrap_or_default(),
                    attempt,
                    error = %e,
                    "Refresh failed, keeping previous value"
                );
            }
        }

        self.status_tx.send_modify(|status| {
            status.attempts += 1;
            status.last_attempt_at = Some(now);
            match &outcome {
                Ok(_) => {
                    status.successes += 1;
                    status.consecutive_failures = 0;
                    status.last_success_at = Some(now);
                }
                Err(e) => {
                    status.failures += 1;
                    status.consecutive_failures += 1;
                    status.last_error = Some(e.to_string());
                }
            }
        });
    }

    fn set_state(&self, state: EngineState) {
        debug!(key = %self.key, ?state, "Refresh engine state change");
        self.status_tx.send_modify(|status| status.state = state);
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the owning cache is gone.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{FetchError, FetchErrorKind, TransformError};
    use crate::fetcher::FetchedObject;
    use crate::key::BackendKind;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    struct StaticFetcher(std::result::Result<&'static str, FetchErrorKind>);

    #[async_trait]
    impl ObjectFetcher for StaticFetcher {
        async fn fetch(&self, key: &CacheKey) -> std::result::Result<FetchedObject, FetchError> {
            match self.0 {
                Ok(body) => Ok(FetchedObject::new(body)),
                Err(kind) => Err(crate::fetcher::fetch_error(key, kind, "scripted")),
            }
        }
    }

    fn build<T: Send + Sync + 'static>(
        fetcher: StaticFetcher,
        transformer: Transformer<T>,
    ) -> (RefreshEngine<T>, Arc<CacheState<T>>) {
        let state = Arc::new(CacheState::new());
        let engine = RefreshEngine::new(
            CacheKey::new(BackendKind::S3, "bucket", "doc.json").unwrap(),
            Duration::from_secs(10),
            Arc::new(fetcher),
            transformer,
            Arc::new(ManualClock::default()),
            Arc::clone(&state),
        );
        (engine, state)
    }

    #[tokio::test]
    async fn test_refresh_once_publishes() {
        let (engine, state) = build(StaticFetcher(Ok(r#"{"a":1}"#)), Transformer::identity());
        let published = engine.refresh_once().await.unwrap();
        assert_eq!(published.version, 1);
        assert_eq!(*state.read().unwrap().value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_failed_stages_publish_nothing() {
        let (engine, state) = build(
            StaticFetcher(Err(FetchErrorKind::NotFound)),
            Transformer::identity(),
        );
        let err = engine.refresh_once().await.unwrap_err();
        assert_eq!(err.stage(), Some(crate::Stage::Fetch));
        assert!(state.read().is_none());

        let (engine, state) = build(StaticFetcher(Ok("{not json")), Transformer::identity());
        assert_eq!(
            engine.refresh_once().await.unwrap_err().stage(),
            Some(crate::Stage::Decode)
        );
        assert!(state.read().is_none());

        let reject: Transformer<Value> = Transformer::new(|_| Err(TransformError::new("no")));
        let (engine, state) = build(StaticFetcher(Ok("{}")), reject);
        assert_eq!(
            engine.refresh_once().await.unwrap_err().stage(),
            Some(crate::Stage::Transform)
        );
        assert!(state.read().is_none());
    }

    #[tokio::test]
    async fn test_attempt_updates_status() {
        let (engine, _) = build(
            StaticFetcher(Err(FetchErrorKind::AccessDenied)),
            Transformer::identity(),
        );
        engine.attempt().await;
        engine.attempt().await;

        let status = engine.status().borrow().clone();
        assert_eq!(status.attempts, 2);
        assert_eq!(status.failures, 2);
        assert_eq!(status.consecutive_failures, 2);
        assert!(status.last_error.unwrap().contains("access denied"));
        assert!(status.last_success_at.is_none());
    }

    /// Records every event with its level and stringified fields.
    #[derive(Clone, Default)]
    struct RecordingLayer(Arc<std::sync::Mutex<Vec<(tracing::Level, HashMap<String, String>)>>>);

    struct FieldMap<'a>(&'a mut HashMap<String, String>);

    impl Visit for FieldMap<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for RecordingLayer {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = HashMap::new();
            event.record(&mut FieldMap(&mut fields));
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), fields));
        }
    }

    #[tokio::test]
    async fn test_failed_attempt_logs_structured_record() {
        let layer = RecordingLayer::default();
        let events = Arc::clone(&layer.0);
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));

        let (engine, _) = build(
            StaticFetcher(Err(FetchErrorKind::NotFound)),
            Transformer::identity(),
        );
        engine.attempt().await;
        let (engine, _) = build(StaticFetcher(Ok("{not json")), Transformer::identity());
        engine.attempt().await;

        let events = events.lock().unwrap();
        let failures: Vec<_> = events
            .iter()
            .filter(|(level, _)| *level == tracing::Level::ERROR)
            .map(|(_, fields)| fields)
            .collect();
        assert_eq!(failures.len(), 2);

        let fetch = failures[0];
        assert_eq!(fetch["backend"], "s3");
        assert_eq!(fetch["bucket"], "bucket");
        assert_eq!(fetch["path"], "doc.json");
        assert_eq!(fetch["stage"], "fetch");
        assert_eq!(fetch["attempt"], "1");
        assert!(fetch["error"].contains("not found"));

        assert_eq!(failures[1]["stage"], "decode");
    }

    #[tokio::test]
    async fn test_run_exits_when_stopped_while_sleeping() {
        let (engine, state) = build(StaticFetcher(Ok("[]")), Transformer::identity());
        let mut status = engine.status();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(engine.run(stop_rx));
        status
            .wait_for(|s| s.state == EngineState::Sleeping)
            .await
            .unwrap();
        assert_eq!(state.version(), 1);

        stop_tx.send_replace(true);
        task.await.unwrap();
        assert_eq!(state.version(), 1);
    }
}
