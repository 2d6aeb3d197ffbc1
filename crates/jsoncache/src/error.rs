//! Error types for jsoncache.

use crate::compression::Compression;
use crate::key::BackendKind;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    AccessDenied,
    Transient,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::AccessDenied => "access denied",
            FetchErrorKind::Transient => "transient",
        };
        f.write_str(s)
    }
}

/// The remote object could not be read.
#[derive(Debug, Clone, Error)]
#[error("Fetch of {backend}://{bucket}/{path} failed ({kind}): {cause}")]
pub struct FetchError {
    pub backend: BackendKind,
    pub bucket: String,
    pub path: String,
    pub kind: FetchErrorKind,
    pub cause: String,
}

/// The payload could not be decompressed or parsed.
#[derive(Debug, Clone, Error)]
#[error("Decode failed (compression: {compression}): {cause}")]
pub struct DecodeError {
    pub compression: Compression,
    pub cause: String,
}

/// The caller-supplied transformer rejected the decoded value.
#[derive(Debug, Clone, Error)]
#[error("Transform failed: {cause}")]
pub struct TransformError {
    pub cause: String,
}

impl TransformError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decode,
    Transform,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Transform => "transform",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Refresh pipeline errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    // Construction errors
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("TTL must be greater than zero")]
    InvalidTtl,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background refresh unavailable: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The refresh stage this error belongs to, if it came out of the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Fetch(_) => Some(Stage::Fetch),
            Error::Decode(_) => Some(Stage::Decode),
            Error::Transform(_) => Some(Stage::Transform),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
