//! Tiers 2 and 3: browser renders through the shared pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use delve_browser::{BrowserPool, RenderOptions, RenderProfile};
use delve_core::config::TierSettings;
use delve_core::error::{DelveError, Result};
use delve_core::types::FetchMethod;

use crate::backend::{FetchBackend, FetchResponse};
use crate::extract::html_to_markdown;

pub struct RenderBackend {
    pool: Arc<BrowserPool>,
    profile: RenderProfile,
    settings: TierSettings,
}

impl RenderBackend {
    /// Headless render (tier 2).
    pub fn standard(pool: Arc<BrowserPool>, settings: TierSettings) -> Self {
        Self {
            pool,
            profile: RenderProfile::Standard,
            settings,
        }
    }

    /// Stealth render (tier 3).
    pub fn stealth(pool: Arc<BrowserPool>, settings: TierSettings) -> Self {
        Self {
            pool,
            profile: RenderProfile::Stealth,
            settings,
        }
    }
}

#[async_trait]
impl FetchBackend for RenderBackend {
    fn method(&self) -> FetchMethod {
        match self.profile {
            RenderProfile::Standard => FetchMethod::Fetch,
            RenderProfile::Stealth => FetchMethod::StealthyFetch,
        }
    }

    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let options = RenderOptions {
            timeout: self.settings.timeout(),
            settle: Duration::from_millis(self.settings.settle_ms),
        };
        let page = self
            .pool
            .render(url, self.profile, options)
            .await
            .map_err(|e| DelveError::FetchTier {
                tier: self.method().to_string(),
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;
        Ok(FetchResponse {
            status: page.status,
            text: html_to_markdown(&page.html),
        })
    }
}
