//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use jsoncache::{CacheKey, FetchError, FetchErrorKind, FetchedObject, ObjectFetcher, RefreshStatus};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// One scripted fetch outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Json(&'static str),
    Bytes(Vec<u8>),
    Fail(FetchErrorKind),
}

/// Fetcher that replays a script, repeating the last step once exhausted.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            *last = Some(step);
        }
        last.clone().expect("script must not be empty")
    }
}

#[async_trait]
impl ObjectFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<FetchedObject, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Json(body) => Ok(FetchedObject::new(body)),
            Step::Bytes(body) => Ok(FetchedObject::new(body)),
            Step::Fail(kind) => Err(FetchError {
                backend: key.backend(),
                bucket: key.bucket().to_string(),
                path: key.path().to_string(),
                kind,
                cause: "scripted failure".to_string(),
            }),
        }
    }
}

/// Fetcher whose requests never complete.
pub struct HangingFetcher {
    pub calls: AtomicUsize,
}

impl HangingFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectFetcher for HangingFetcher {
    async fn fetch(&self, _key: &CacheKey) -> Result<FetchedObject, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Wait (bounded) until the engine has completed `attempts` attempts.
pub async fn wait_for_attempts(status: &mut watch::Receiver<RefreshStatus>, attempts: u64) {
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.attempts >= attempts),
    )
    .await
    .expect("timed out waiting for refresh attempt")
    .expect("refresh engine went away");
}
