//! Amazon S3 (and S3-compatible) fetcher.

use super::{FetchedObject, ObjectFetcher, fetch_error};
use crate::config::S3Config;
use crate::error::{FetchError, FetchErrorKind};
use crate::key::CacheKey;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct S3Fetcher {
    client: Client,
}

impl S3Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS credential chain.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        Self::new(Client::from_conf(s3_config))
    }
}

#[async_trait]
impl ObjectFetcher for S3Fetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<FetchedObject, FetchError> {
        let start = Instant::now();
        let output = self
            .client
            .get_object()
            .bucket(key.bucket())
            .key(key.path())
            .send()
            .await
            .map_err(|e| {
                fetch_error(key, classify_sdk_error(&e), DisplayErrorContext(&e).to_string())
            })?;

        let content_encoding = output.content_encoding().map(str::to_string);
        let mut stream = output.body;
        let mut body = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                fetch_error(
                    key,
                    FetchErrorKind::Transient,
                    format!("Body stream interrupted: {}", e),
                )
            })?;
            body.extend_from_slice(&chunk);
            debug!(key = %key, bytes_read = body.len(), "Read chunk from S3");
        }

        debug!(
            key = %key,
            bytes = body.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Downloaded S3 object"
        );

        Ok(FetchedObject {
            body: body.into(),
            content_encoding,
        })
    }
}

fn classify_sdk_error(err: &SdkError<GetObjectError>) -> FetchErrorKind {
    match err {
        SdkError::ServiceError(ctx) => classify(
            err.code(),
            ctx.raw().status().as_u16(),
            ctx.err().is_no_such_key(),
        ),
        _ => FetchErrorKind::Transient,
    }
}

fn classify(code: Option<&str>, status: u16, no_such_key: bool) -> FetchErrorKind {
    if no_such_key {
        return FetchErrorKind::NotFound;
    }
    match code {
        Some("NoSuchKey" | "NoSuchBucket") => return FetchErrorKind::NotFound,
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
            return FetchErrorKind::AccessDenied;
        }
        _ => {}
    }
    match status {
        404 => FetchErrorKind::NotFound,
        401 | 403 => FetchErrorKind::AccessDenied,
        _ => FetchErrorKind::Transient,
    }
}
