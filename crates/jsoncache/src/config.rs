//! Cache configuration.

use crate::key::{BackendKind, CacheKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Refresh interval used when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Configuration for a single cached object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage provider holding the object.
    pub backend: BackendKind,
    /// Bucket name.
    pub bucket: String,
    /// Object path inside the bucket.
    pub path: String,
    /// Seconds between refresh attempts.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Wait for the first value before construction returns.
    #[serde(default)]
    pub block_until_cached: bool,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub gcs: GcsConfig,
}

/// S3 client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Attempts made by the SDK's own transport retry layer.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// GCS client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default = "default_gcs_endpoint")]
    pub endpoint: String,
    /// OAuth2 bearer token. Falls back to `GOOGLE_OAUTH_ACCESS_TOKEN`, then
    /// the GCE metadata server.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_gcs_timeout")]
    pub timeout_secs: u64,
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_gcs_timeout() -> u64 {
    30
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            connect_timeout_secs: default_connect_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gcs_endpoint(),
            access_token: None,
            timeout_secs: default_gcs_timeout(),
        }
    }
}

impl CacheConfig {
    pub fn new(backend: BackendKind, bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            path: path.into(),
            ttl_seconds: default_ttl_seconds(),
            block_until_cached: false,
            s3: S3Config::default(),
            gcs: GcsConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn key(&self) -> Result<CacheKey> {
        CacheKey::new(self.backend, self.bucket.clone(), &self.path)
    }

    pub fn ttl(&self) -> Result<Duration> {
        if self.ttl_seconds == 0 {
            return Err(Error::InvalidTtl);
        }
        Ok(Duration::from_secs(self.ttl_seconds))
    }
}
