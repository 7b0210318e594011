// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the messaging provider.
//!
//! Handles authentication headers, per-request timeouts, and transient-error
//! retry with exponential backoff and jitter. Poll failures are surfaced to
//! the caller and never kill the poll loop.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};
use wireline_core::WirelineError;

use crate::types::{InboundEnvelope, InboundMessage, SendMessageBody, SendMessageResponse};

/// Maximum messages requested per poll.
pub const POLL_LIMIT: u32 = 100;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 4_000;

/// Credentials and endpoint for the provider API.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub api_base: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_base", &self.api_base)
            .field("api_key", &"[redacted]")
            .field("api_secret", &"[redacted]")
            .finish()
    }
}

/// Messaging-provider HTTP client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    api_base: String,
}

impl ProviderClient {
    /// Creates a client with the provider's auth headers installed.
    pub fn new(creds: &ProviderCredentials, fetch_timeout: Duration) -> Result<Self, WirelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&creds.api_key)
                .map_err(|e| WirelineError::Config(format!("invalid api_key header value: {e}")))?,
        );
        headers.insert(
            "x-api-secret",
            HeaderValue::from_str(&creds.api_secret).map_err(|e| {
                WirelineError::Config(format!("invalid api_secret header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| WirelineError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_base: creds.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch up to [`POLL_LIMIT`] latest messages.
    pub async fn fetch_messages(&self) -> Result<Vec<InboundMessage>, WirelineError> {
        let url = format!("{}/v2/messages?limit={POLL_LIMIT}", self.api_base);
        let body = self
            .get_with_retry(&url)
            .await?;
        let envelope: InboundEnvelope =
            serde_json::from_str(&body).map_err(|e| WirelineError::Provider {
                message: format!("failed to parse poll response: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(envelope.data)
    }

    /// Send one outbound message chunk. Returns the provider's handle, when
    /// it reports one.
    pub async fn send_message(
        &self,
        number: &str,
        from_number: &str,
        content: &str,
    ) -> Result<Option<String>, WirelineError> {
        let url = format!("{}/send-message", self.api_base);
        let body = serde_json::to_string(&SendMessageBody {
            number,
            from_number,
            content,
        })
        .map_err(|e| WirelineError::Internal(format!("send body failed to encode: {e}")))?;

        let response = self.post_with_retry(&url, body).await?;
        let parsed: SendMessageResponse =
            serde_json::from_str(&response).unwrap_or(SendMessageResponse {
                message_handle: None,
                id: None,
            });
        Ok(parsed.handle().map(|s| s.to_string()))
    }

    /// Best-effort typing indicator. One attempt, no retry.
    pub async fn send_typing_indicator(&self, number: &str) -> Result<(), WirelineError> {
        let url = format!("{}/send-typing-indicator", self.api_base);
        let body = serde_json::json!({ "number": number }).to_string();
        self.post_once(&url, body).await.map(|_| ())
    }

    /// Best-effort read receipt. One attempt, no retry; success is advisory.
    pub async fn mark_read(&self, number: &str, message_handle: &str) -> Result<(), WirelineError> {
        let url = format!("{}/mark-read", self.api_base);
        let body = serde_json::json!({
            "number": number,
            "message_handle": message_handle,
        })
        .to_string();
        self.post_once(&url, body).await.map(|_| ())
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, WirelineError> {
        self.with_retry(|| self.client.get(url).send()).await
    }

    async fn post_with_retry(&self, url: &str, body: String) -> Result<String, WirelineError> {
        self.with_retry(|| {
            self.client
                .post(url)
                .header("content-type", "application/json")
                .body(body.clone())
                .send()
        })
        .await
    }

    async fn post_once(&self, url: &str, body: String) -> Result<String, WirelineError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| WirelineError::Provider {
                message: format!("request to {url} failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WirelineError::Provider {
                message: format!("provider returned {status}: {body}"),
                source: None,
            });
        }
        read_success(response).await
    }

    /// Runs `send` up to [`MAX_ATTEMPTS`] times, backing off with jitter on
    /// 429/502/503/504 and network errors. Other 4xx/5xx fail immediately.
    async fn with_retry<F, Fut>(&self, send: F) -> Result<String, WirelineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut last_error: Option<WirelineError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying provider request");
                tokio::time::sleep(delay).await;
            }

            match send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return read_success(response).await;
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = WirelineError::Provider {
                        message: format!("provider returned {status}: {body}"),
                        source: None,
                    };
                    if !is_retryable_status(status) {
                        return Err(err);
                    }
                    warn!(status = %status, attempt, "transient provider error");
                    last_error = Some(err);
                }
                Err(e) => {
                    let err = WirelineError::Provider {
                        message: format!("provider request failed: {e}"),
                        source: Some(Box::new(e)),
                    };
                    warn!(attempt, error = %err, "provider network error");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WirelineError::Provider {
            message: "provider request failed after retries".into(),
            source: None,
        }))
    }
}

async fn read_success(response: reqwest::Response) -> Result<String, WirelineError> {
    response.text().await.map_err(|e| WirelineError::Provider {
        message: format!("failed to read response body: {e}"),
        source: Some(Box::new(e)),
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

/// Exponential backoff with jitter: 500ms, 1000ms, 2000ms, capped at 4000ms,
/// plus up to 25% random jitter.
fn backoff_delay(prior_attempts: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << prior_attempts.min(16));
    let capped = base.min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base: &str) -> ProviderClient {
        ProviderClient::new(
            &ProviderCredentials {
                api_base: base.to_string(),
                api_key: "test-key".into(),
                api_secret: "test-secret".into(),
            },
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_messages_parses_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/messages"))
            .and(query_param("limit", "100"))
            .and(header("x-api-key", "test-key"))
            .and(header("x-api-secret", "test-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "message_handle": "m1",
                    "content": "hello",
                    "from_number": "+15550001111",
                    "is_outbound": false,
                }]
            })))
            .mount(&server)
            .await;

        let messages = test_client(&server.uri()).fetch_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_handle, "m1");
        assert_eq!(messages[0].sender(), Some("+15550001111"));
    }

    #[tokio::test]
    async fn fetch_retries_on_502_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/messages"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let messages = test_client(&server.uri()).fetch_messages().await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn fetch_does_not_retry_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/messages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_client(&server.uri()).fetch_messages().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/messages"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = test_client(&server.uri()).fetch_messages().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_message_returns_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message_handle": "out_1"})),
            )
            .mount(&server)
            .await;

        let handle = test_client(&server.uri())
            .send_message("+15550001111", "+15550002222", "hi")
            .await
            .unwrap();
        assert_eq!(handle.as_deref(), Some("out_1"));
    }

    #[tokio::test]
    async fn typing_indicator_is_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-typing-indicator"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_client(&server.uri())
            .send_typing_indicator("+15550001111")
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn backoff_stays_within_bounds() {
        for attempt in 0..6 {
            let delay = backoff_delay(attempt).as_millis() as u64;
            assert!(delay >= 500, "attempt {attempt} delay {delay}");
            assert!(delay <= 5_000, "attempt {attempt} delay {delay}");
        }
    }
}
