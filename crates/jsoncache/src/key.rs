//! Cache key validation and normalisation.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Bucket names: alphanumerics and hyphens only.
static BUCKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-]+$").expect("bucket regex"));

/// Object paths: at least two characters, no leading or trailing slash.
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.\-_][a-zA-Z0-9.\-_/]*[a-zA-Z0-9.\-_]$").expect("path regex")
});

/// Remote object store provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    S3,
    Gcs,
}

impl BackendKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::S3 => "s3",
            BackendKind::Gcs => "gcs",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(BackendKind::S3),
            "gcs" => Ok(BackendKind::Gcs),
            other => Err(Error::InvalidKey(format!("Unknown backend: {}", other))),
        }
    }
}

/// The single remote object a cache instance tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    backend: BackendKind,
    bucket: String,
    path: String,
}

impl CacheKey {
    /// Validate and normalise a key. The path is normalised before validation.
    pub fn new(backend: BackendKind, bucket: impl Into<String>, path: &str) -> Result<Self> {
        let bucket = bucket.into();
        if !is_valid_bucket(&bucket) {
            return Err(Error::InvalidKey(format!("Invalid bucket name: {:?}", bucket)));
        }

        let normalized = normalize_path(path);
        if !is_valid_path(&normalized) {
            return Err(Error::InvalidKey(format!(
                "Invalid path for storage: {:?}",
                path
            )));
        }

        Ok(Self {
            backend,
            bucket,
            path: normalized,
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.backend, self.bucket, self.path)
    }
}

pub fn is_valid_bucket(bucket: &str) -> bool {
    BUCKET_RE.is_match(bucket)
}

pub fn is_valid_path(path: &str) -> bool {
    PATH_RE.is_match(path)
        && !path
            .split('/')
            .any(|segment| segment == "." || segment == "..")
}

/// Collapse repeated separators, drop `.` segments and resolve `..`
/// against the preceding segment. A leading `/` is preserved so that
/// absolute paths still fail validation.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
