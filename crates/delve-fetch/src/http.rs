//! Tier 1: direct HTTP GET with a desktop-browser fingerprint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use delve_core::config::{FetchConfig, TierSettings};
use delve_core::error::{DelveError, Result};
use delve_core::types::FetchMethod;

use crate::backend::{FetchBackend, FetchResponse};
use crate::extract::{html_to_markdown, is_html};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub struct HttpBackend {
    client: reqwest::Client,
    settings: TierSettings,
    max_bytes: usize,
}

impl HttpBackend {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .default_headers(headers)
            .timeout(config.direct.timeout())
            .build()
            .map_err(|e| DelveError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings: config.direct,
            max_bytes: config.max_bytes,
        })
    }

    fn tier_error(&self, url: &str, reason: impl Into<String>) -> DelveError {
        DelveError::FetchTier {
            tier: FetchMethod::Get.to_string(),
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<FetchResponse, reqwest::Error> {
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Stop reading at the cap.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = self.max_bytes.saturating_sub(bytes.len());
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                warn!(url, max = self.max_bytes, "Response truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        let text = if is_html(content_type.as_deref()) {
            html_to_markdown(&body)
        } else {
            body.into_owned()
        };
        Ok(FetchResponse { status, text })
    }
}

/// Statuses worth another attempt.
fn is_transient(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

#[async_trait]
impl FetchBackend for HttpBackend {
    fn method(&self) -> FetchMethod {
        FetchMethod::Get
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let attempts = self.settings.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
            }
            match self.attempt(url).await {
                Ok(resp) if is_transient(resp.status) && attempt < attempts => {
                    debug!(url, status = resp.status, attempt, "Transient status, retrying");
                    last_error = format!("HTTP {}", resp.status);
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    debug!(url, attempt, error = %e, "GET attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(self.tier_error(url, last_error))
    }
}
