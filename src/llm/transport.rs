//! Streaming HTTP transport for backend requests.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::llm::payload::BackendRequest;

/// Whole-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const TIMEOUT_ENV_VAR: &str = "GIT_COMMITX_TIMEOUT";

/// Longest error body kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Response body as it arrives from the network.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Something that can POST a request and hand back the streamed body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return its body stream once the status is known.
    async fn open(&self, request: BackendRequest) -> Result<ChunkStream, TransportError>;
}

/// Get the request timeout from env var or use default.
fn get_timeout() -> Duration {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    "Invalid {} value '{}', using default {}s",
                    TIMEOUT_ENV_VAR, v, DEFAULT_TIMEOUT_SECS
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        },
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(get_timeout())
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("git-commitx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: BackendRequest) -> Result<ChunkStream, TransportError> {
        debug!("{}", request.describe());

        let url = request.url.to_string();
        let mut builder = self.client.post(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&request.body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        debug!("Streaming response from {} ({})", url, status);
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::Stream))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    // ============================================
    // Timeout Configuration Tests
    // ============================================

    #[test]
    fn test_get_timeout_default() {
        temp_env::with_var_unset(TIMEOUT_ENV_VAR, || {
            assert_eq!(get_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        });
    }

    #[test]
    fn test_get_timeout_from_env() {
        temp_env::with_var(TIMEOUT_ENV_VAR, Some("30"), || {
            assert_eq!(get_timeout(), Duration::from_secs(30));
        });
    }

    #[test]
    fn test_get_timeout_invalid_env_uses_default() {
        temp_env::with_var(TIMEOUT_ENV_VAR, Some("soon"), || {
            assert_eq!(get_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        });
    }

    #[test]
    fn test_get_timeout_zero_uses_default() {
        temp_env::with_var(TIMEOUT_ENV_VAR, Some("0"), || {
            assert_eq!(get_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        });
    }

    #[test]
    fn test_get_timeout_empty_env_uses_default() {
        temp_env::with_var(TIMEOUT_ENV_VAR, Some(""), || {
            assert_eq!(get_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        });
    }

    #[tokio::test]
    async fn test_mock_transport_yields_chunks() {
        let mut transport = MockTransport::new();
        transport.expect_open().times(1).returning(|_| {
            Ok(stream::iter(vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))])
                .boxed())
        });

        let request = BackendRequest {
            url: reqwest::Url::parse("http://localhost/api/generate").unwrap(),
            headers: Vec::new(),
            body: serde_json::json!({}),
        };
        let chunks: Vec<_> = transport.open(request).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 2);
    }
}
