//! Object store fetchers.

mod gcs;
mod s3;

pub use gcs::GcsFetcher;
pub use s3::S3Fetcher;

use crate::config::CacheConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::key::{BackendKind, CacheKey};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;

/// Raw object body plus any encoding the backend reported.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub body: Bytes,
    pub content_encoding: Option<String>,
}

impl FetchedObject {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_encoding: None,
        }
    }
}

/// Trait for reading a full object body from remote storage.
///
/// Implementations make exactly one attempt per call; retrying is the
/// refresh engine's job.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<FetchedObject, FetchError>;
}

/// The supported storage backends.
pub enum StorageBackend {
    S3(S3Fetcher),
    Gcs(GcsFetcher),
}

impl StorageBackend {
    /// Build the production fetcher for the configured backend.
    pub async fn from_config(config: &CacheConfig) -> crate::Result<Self> {
        match config.backend {
            BackendKind::S3 => Ok(StorageBackend::S3(S3Fetcher::from_config(&config.s3).await)),
            BackendKind::Gcs => Ok(StorageBackend::Gcs(GcsFetcher::from_config(&config.gcs)?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            StorageBackend::S3(_) => BackendKind::S3,
            StorageBackend::Gcs(_) => BackendKind::Gcs,
        }
    }
}

#[async_trait]
impl ObjectFetcher for StorageBackend {
    async fn fetch(&self, key: &CacheKey) -> Result<FetchedObject, FetchError> {
        if key.backend() != self.kind() {
            return Err(fetch_error(
                key,
                FetchErrorKind::Transient,
                format!(
                    "Misconfigured fetcher: {} client cannot read {} objects",
                    self.kind(),
                    key.backend()
                ),
            ));
        }
        match self {
            StorageBackend::S3(fetcher) => fetcher.fetch(key).await,
            StorageBackend::Gcs(fetcher) => fetcher.fetch(key).await,
        }
    }
}

/// Production fetcher built on first use, inside the refresh runtime.
///
/// Client construction failures surface as transient fetch errors so the
/// engine retries them on its normal schedule.
pub struct ConfiguredFetcher {
    config: CacheConfig,
    backend: OnceCell<StorageBackend>,
}

impl ConfiguredFetcher {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            backend: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ObjectFetcher for ConfiguredFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<FetchedObject, FetchError> {
        let backend = self
            .backend
            .get_or_try_init(|| StorageBackend::from_config(&self.config))
            .await
            .map_err(|e| fetch_error(key, FetchErrorKind::Transient, e.to_string()))?;
        backend.fetch(key).await
    }
}

pub(crate) fn fetch_error(
    key: &CacheKey,
    kind: FetchErrorKind,
    cause: impl Into<String>,
) -> FetchError {
    FetchError {
        backend: key.backend(),
        bucket: key.bucket().to_string(),
        path: key.path().to_string(),
        kind,
        cause: cause.into(),
    }
}
