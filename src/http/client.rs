use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::mirror::MirrorError;

/// Rate-limited JSON client for the mirror API
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    client: Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    base_url: String,
}

impl RateLimitedHttpClient {
    /// Create a client sending `Authorization: Bearer <token>` plus `extra_headers`
    pub fn new(
        base_url: &str,
        token: &str,
        extra_headers: &[(&'static str, String)],
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| MirrorError::InvalidRequest("token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        for (name, value) in extra_headers {
            let value = HeaderValue::from_str(value)
                .map_err(|_| MirrorError::InvalidRequest(format!("invalid value for header {name}")))?;
            headers.insert(*name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        // Small bursts are fine; the sustained rate is what the API enforces
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(per_second);

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait for a rate-limit permit, send, and decode the JSON body.
    /// Non-success statuses are classified into `MirrorError`s.
    pub async fn send_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, MirrorError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Sending mirror request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(MirrorError::from_status(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| MirrorError::InvalidResponse(e.to_string()))
    }
}
