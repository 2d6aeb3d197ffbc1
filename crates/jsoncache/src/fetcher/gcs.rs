//! Google Cloud Storage fetcher over the JSON API.

use super::{FetchedObject, ObjectFetcher, fetch_error};
use crate::config::GcsConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::key::CacheKey;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
/// Refresh metadata tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// How long to stay anonymous after the metadata server could not be reached.
const ANONYMOUS_RETRY: Duration = Duration::from_secs(60 * 60);

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
enum TokenSource {
    Static(String),
    Metadata(String),
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Last metadata lookup; `token: None` means anonymous access.
struct CachedToken {
    token: Option<String>,
    valid_until: Instant,
}

pub struct GcsFetcher {
    client: reqwest::Client,
    endpoint: Url,
    token: TokenSource,
    cached_token: Mutex<Option<CachedToken>>,
}

impl GcsFetcher {
    pub fn from_config(config: &GcsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let token = match config
            .access_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
        {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::Metadata(METADATA_TOKEN_URL.to_string()),
        };

        Self::with_client(client, &config.endpoint, token)
    }

    /// Fetcher authenticating with a fixed bearer token.
    pub fn with_token(endpoint: &str, token: impl Into<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), endpoint, TokenSource::Static(token.into()))
    }

    fn with_client(client: reqwest::Client, endpoint: &str, token: TokenSource) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid GCS endpoint {}: {}", endpoint, e)))?;
        Ok(Self {
            client,
            endpoint,
            token,
            cached_token: Mutex::new(None),
        })
    }

    fn object_url(&self, key: &CacheKey) -> std::result::Result<Url, FetchError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                fetch_error(
                    key,
                    FetchErrorKind::Transient,
                    format!("GCS endpoint cannot be a base: {}", self.endpoint),
                )
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", key.bucket(), "o", key.path()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// Resolve a bearer token. A missing metadata server means anonymous access.
    ///
    /// Metadata lookups are cached until the token expires, so most fetches
    /// make a single outbound call.
    async fn bearer_token(&self) -> Option<String> {
        let url = match &self.token {
            TokenSource::Static(token) => return Some(token.clone()),
            TokenSource::Metadata(url) => url,
        };

        let mut cached = self.cached_token.lock().await;
        if let Some(entry) = cached.as_ref().filter(|e| Instant::now() < e.valid_until) {
            return entry.token.clone();
        }

        let entry = self.metadata_token(url).await;
        let token = entry.token.clone();
        *cached = Some(entry);
        token
    }

    async fn metadata_token(&self, url: &str) -> CachedToken {
        let anonymous = CachedToken {
            token: None,
            valid_until: Instant::now() + ANONYMOUS_RETRY,
        };

        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match response {
            Ok(r) => match r.json::<MetadataToken>().await {
                Ok(token) => {
                    let lifetime = Duration::from_secs(token.expires_in)
                        .saturating_sub(TOKEN_EXPIRY_MARGIN);
                    debug!(expires_in = token.expires_in, "Fetched metadata token");
                    CachedToken {
                        token: Some(token.access_token),
                        valid_until: Instant::now() + lifetime,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Malformed metadata token response");
                    anonymous
                }
            },
            Err(e) => {
                debug!(error = %e, "No metadata token available, using anonymous access");
                anonymous
            }
        }
    }
}

#[async_trait]
impl ObjectFetcher for GcsFetcher {
    async fn fetch(&self, key: &CacheKey) -> std::result::Result<FetchedObject, FetchError> {
        let start = Instant::now();
        let url = self.object_url(key)?;

        // Without this GCS serves gzip-encoded objects decompressed, while the
        // path suffix still says gzip.
        let mut request = self.client.get(url).header(ACCEPT_ENCODING, "gzip");
        if let Some(token) = self.bearer_token().await {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| fetch_error(key, FetchErrorKind::Transient, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(fetch_error(
                key,
                classify_status(status),
                format!("HTTP {}: {}", status, detail.trim()),
            ));
        }

        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(key, FetchErrorKind::Transient, e.to_string()))?;

        debug!(
            key = %key,
            bytes = body.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Downloaded GCS object"
        );

        Ok(FetchedObject {
            body,
            content_encoding,
        })
    }
}

fn classify_status(status: StatusCode) -> FetchErrorKind {
    match status {
        StatusCode::NOT_FOUND => FetchErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchErrorKind::AccessDenied,
        _ => FetchErrorKind::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::BackendKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_object_url_escapes_path() {
        let fetcher = GcsFetcher::with_token("https://storage.googleapis.com", "t").unwrap();
        let key = CacheKey::new(BackendKind::Gcs, "models", "taar/whitelist.json").unwrap();
        let url = fetcher.object_url(&key).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/models/o/taar%2Fwhitelist.json?alt=media"
        );
    }

    #[tokio::test]
    async fn test_metadata_token_is_reused_until_expiry() {
        let metadata = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("metadata-flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "meta-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&metadata)
            .await;

        let storage = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer meta-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(2)
            .mount(&storage)
            .await;

        let fetcher = GcsFetcher::with_client(
            reqwest::Client::new(),
            &storage.uri(),
            TokenSource::Metadata(format!("{}/token", metadata.uri())),
        )
        .unwrap();
        let key = CacheKey::new(BackendKind::Gcs, "models", "doc.json").unwrap();

        fetcher.fetch(&key).await.unwrap();
        fetcher.fetch(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_metadata_server_is_not_retried_every_fetch() {
        let metadata = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&metadata)
            .await;

        let storage = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(3)
            .mount(&storage)
            .await;

        let fetcher = GcsFetcher::with_client(
            reqwest::Client::new(),
            &storage.uri(),
            TokenSource::Metadata(format!("{}/token", metadata.uri())),
        )
        .unwrap();
        let key = CacheKey::new(BackendKind::Gcs, "models", "doc.json").unwrap();

        for _ in 0..3 {
            fetcher.fetch(&key).await.unwrap();
        }
        let requests = storage.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| !r.headers.contains_key("authorization")));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND), FetchErrorKind::NotFound);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), FetchErrorKind::AccessDenied);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            FetchErrorKind::AccessDenied
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            FetchErrorKind::Transient
        );
    }
}
