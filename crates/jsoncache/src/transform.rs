//! Caller-supplied mapping from decoded JSON to the published value.

use crate::error::TransformError;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

type TransformFn<T> = dyn Fn(Value) -> Result<T, TransformError> + Send + Sync;

/// Pure function applied to every decoded document before it is published.
///
/// It runs on the refresh thread, so it may be expensive, but it must not
/// touch the cache it belongs to or keep references past the call.
pub struct Transformer<T> {
    f: Arc<TransformFn<T>>,
}

impl<T> Transformer<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Apply the transform. A panic is reported as a `TransformError`.
    pub fn apply(&self, value: Value) -> Result<T, TransformError> {
        match catch_unwind(AssertUnwindSafe(|| (self.f)(value))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TransformError::new(format!("Transformer panicked: {}", message)))
            }
        }
    }
}

impl Transformer<Value> {
    pub fn identity() -> Self {
        Self::new(Ok)
    }
}

impl<T> Clone for Transformer<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}
