//! Per-URL tier escalation and concurrent fan-out.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use delve_browser::BrowserPool;
use delve_core::config::FetchConfig;
use delve_core::error::{DelveError, Result};
use delve_core::types::{FetchMethod, FetchOutcome};

use crate::backend::FetchBackend;
use crate::cache::DocumentCache;
use crate::http::HttpBackend;
use crate::render::RenderBackend;

/// Cached in place of content when every tier fails.
pub const FAILURE_MARKER: &str =
    "Failed to fetch content: All methods (get, fetch, stealthy_fetch) failed or returned empty content";

pub struct FetchPipeline {
    tiers: Vec<Arc<dyn FetchBackend>>,
    cache: Arc<DocumentCache>,
}

impl FetchPipeline {
    /// Tiers are tried in the given order.
    pub fn new(tiers: Vec<Arc<dyn FetchBackend>>, cache: Arc<DocumentCache>) -> Self {
        Self { tiers, cache }
    }

    /// The standard chain: direct GET, headless render, stealth render.
    pub fn from_config(config: &FetchConfig, pool: Arc<BrowserPool>, cache: Arc<DocumentCache>) -> Result<Self> {
        let tiers: Vec<Arc<dyn FetchBackend>> = vec![
            Arc::new(HttpBackend::new(config)?),
            Arc::new(RenderBackend::standard(pool.clone(), config.render)),
            Arc::new(RenderBackend::stealth(pool, config.stealth)),
        ];
        Ok(Self::new(tiers, cache))
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Fetch one URL, escalating through the tiers until one succeeds, and
    /// cache the content or the failure marker. Never fails.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let (method, text) = match self.first_success(url).await {
            Ok((method, text)) => (method, text),
            Err(e) => {
                warn!(url, error = %e, "All fetch tiers failed");
                (FetchMethod::Failed, FAILURE_MARKER.to_string())
            }
        };

        let doc_id = match self.cache.insert(url, &text) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(url, error = %e, "Could not cache fetched content");
                None
            }
        };
        if method.is_success() {
            info!(url, %method, doc_id, "Fetched and cached");
        }
        FetchOutcome {
            doc_id,
            link: url.to_string(),
            method,
        }
    }

    /// Fetch every URL concurrently. Outcomes are in input order.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchOutcome> {
        join_all(urls.iter().map(|url| self.fetch(url))).await
    }

    async fn first_success(&self, url: &str) -> Result<(FetchMethod, String)> {
        if let Err(e) = url::Url::parse(url) {
            warn!(url, error = %e, "Not a valid URL");
            return Err(DelveError::AllTiersFailed(url.to_string()));
        }
        for tier in &self.tiers {
            let method = tier.method();
            info!(url, tier = %method, "Trying fetch tier");
            match tier.fetch(url).await {
                Ok(resp) if resp.is_success() => return Ok((method, resp.text)),
                Ok(resp) if resp.text.trim().is_empty() => {
                    warn!(url, tier = %method, status = resp.status, "Tier returned empty content");
                }
                Ok(resp) => {
                    warn!(url, tier = %method, status = resp.status, "Tier returned unsuccessful status");
                }
                Err(e) => warn!(url, tier = %method, error = %e, "Tier failed"),
            }
        }
        Err(DelveError::AllTiersFailed(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FetchResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        method: FetchMethod,
        result: fn(&str) -> Result<FetchResponse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchBackend for Scripted {
        fn method(&self) -> FetchMethod {
            self.method
        }

        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)(url)
        }
    }

    fn tier(method: FetchMethod, result: fn(&str) -> Result<FetchResponse>) -> Arc<Scripted> {
        Arc::new(Scripted {
            method,
            result,
            calls: AtomicUsize::new(0),
        })
    }

    fn ok(_: &str) -> Result<FetchResponse> {
        Ok(FetchResponse {
            status: 200,
            text: "# Page".into(),
        })
    }

    fn empty(_: &str) -> Result<FetchResponse> {
        Ok(FetchResponse {
            status: 200,
            text: " \n".into(),
        })
    }

    fn blocked(_: &str) -> Result<FetchResponse> {
        Ok(FetchResponse {
            status: 403,
            text: "Access denied".into(),
        })
    }

    fn broken(url: &str) -> Result<FetchResponse> {
        Err(DelveError::FetchTier {
            tier: "stealthy_fetch".into(),
            url: url.into(),
            reason: "timed out".into(),
        })
    }

    fn pipeline(tiers: &[Arc<Scripted>]) -> FetchPipeline {
        let tiers = tiers.iter().map(|t| t.clone() as Arc<dyn FetchBackend>).collect();
        FetchPipeline::new(tiers, Arc::new(DocumentCache::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_first_tier_success_skips_the_rest() {
        let tiers = [
            tier(FetchMethod::Get, ok),
            tier(FetchMethod::Fetch, ok),
            tier(FetchMethod::StealthyFetch, ok),
        ];
        let pipeline = pipeline(&tiers);
        let outcome = pipeline.fetch("https://a.example").await;
        assert_eq!(outcome.method, FetchMethod::Get);
        assert_eq!(tiers[1].calls.load(Ordering::SeqCst), 0);
        assert_eq!(tiers[2].calls.load(Ordering::SeqCst), 0);
        let doc = pipeline.cache().get(outcome.doc_id.unwrap()).unwrap().unwrap();
        assert_eq!(doc.text, "# Page");
    }

    #[tokio::test]
    async fn test_escalates_past_empty_and_blocked() {
        let tiers = [
            tier(FetchMethod::Get, empty),
            tier(FetchMethod::Fetch, blocked),
            tier(FetchMethod::StealthyFetch, ok),
        ];
        let outcome = pipeline(&tiers).fetch("https://a.example").await;
        assert_eq!(outcome.method, FetchMethod::StealthyFetch);
        assert!(tiers.iter().all(|t| t.calls.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_exhaustion_caches_failure_marker() {
        let tiers = [
            tier(FetchMethod::Get, blocked),
            tier(FetchMethod::Fetch, empty),
            tier(FetchMethod::StealthyFetch, broken),
        ];
        let pipeline = pipeline(&tiers);
        let outcome = pipeline.fetch("https://down.example").await;
        assert_eq!(outcome.method, FetchMethod::Failed);
        let doc = pipeline.cache().get(outcome.doc_id.unwrap()).unwrap().unwrap();
        assert_eq!(doc.text, FAILURE_MARKER);
        assert_eq!(doc.link, "https://down.example");
    }

    #[tokio::test]
    async fn test_invalid_url_skips_tiers() {
        let tiers = [tier(FetchMethod::Get, ok)];
        let outcome = pipeline(&tiers).fetch("not a url").await;
        assert_eq!(outcome.method, FetchMethod::Failed);
        assert_eq!(tiers[0].calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_input_order() {
        fn by_url(url: &str) -> Result<FetchResponse> {
            if url.contains("bad") { blocked(url) } else { ok(url) }
        }
        let tiers = [tier(FetchMethod::Get, by_url)];
        let urls: Vec<String> = ["https://1.example", "https://bad.example", "https://3.example"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcomes = pipeline(&tiers).fetch_all(&urls).await;
        let links: Vec<&str> = outcomes.iter().map(|o| o.link.as_str()).collect();
        assert_eq!(links, vec!["https://1.example", "https://bad.example", "https://3.example"]);
        assert_eq!(outcomes[1].method, FetchMethod::Failed);
        assert!(outcomes[0].method.is_success() && outcomes[2].method.is_success());
        let mut ids: Vec<i64> = outcomes.iter().filter_map(|o| o.doc_id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
