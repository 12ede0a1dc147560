//! Web search collaborators: SearXNG and Brave.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use delve_core::config::SearchConfig;
use delve_core::error::{DelveError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// At most `max_results` results, best first.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    SearXng,
    Brave,
}

/// HTTP search against a configured SearXNG instance or the Brave API.
pub struct WebSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    backend: Backend,
}

impl WebSearch {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        // Brave is recognized by host; anything else speaks SearXNG JSON.
        let backend = if base_url.contains("brave.com") {
            Backend::Brave
        } else {
            Backend::SearXng
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DelveError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            backend,
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let base_url = config
            .api_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DelveError::Config("No search backend configured (set search.api_url)".into()))?;
        Self::new(base_url, config.resolve_api_key())
    }
}

#[async_trait]
impl SearchProvider for WebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!(query, max_results, backend = ?self.backend, "Web search");
        let request = match self.backend {
            Backend::Brave => self
                .client
                .get(format!("{}/res/v1/web/search", self.base_url))
                .header("X-Subscription-Token", self.api_key.clone().unwrap_or_default())
                .query(&[("q", query), ("count", &max_results.to_string())]),
            Backend::SearXng => self
                .client
                .get(format!("{}/search", self.base_url))
                .query(&[("q", query), ("format", "json")]),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| DelveError::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DelveError::Search(format!("search API returned HTTP {status}")));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DelveError::Search(format!("invalid search response: {e}")))?;

        Ok(match self.backend {
            Backend::Brave => parse_brave_results(&body, max_results),
            Backend::SearXng => parse_searxng_results(&body, max_results),
        })
    }
}

fn parse_results(results: &serde_json::Value, snippet_field: &str, max: usize) -> Vec<SearchResult> {
    let empty = vec![];
    results
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .filter_map(|r| {
            Some(SearchResult {
                url: r["url"].as_str()?.to_string(),
                title: r["title"].as_str().unwrap_or("").to_string(),
                description: r[snippet_field].as_str().unwrap_or("").to_string(),
            })
        })
        .take(max)
        .collect()
}

fn parse_searxng_results(body: &serde_json::Value, max: usize) -> Vec<SearchResult> {
    parse_results(&body["results"], "content", max)
}

fn parse_brave_results(body: &serde_json::Value, max: usize) -> Vec<SearchResult> {
    parse_results(&body["web"]["results"], "description", max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_searxng_results() {
        let body = serde_json::json!({
            "results": [
                {"title": "Rust Lang", "url": "https://rust-lang.org", "content": "A systems programming language"},
                {"title": "No URL"},
                {"title": "Rust Book", "url": "https://doc.rust-lang.org/book/", "content": "The Rust Programming Language"}
            ]
        });
        let results = parse_searxng_results(&body, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust Lang");
        assert_eq!(results[1].description, "The Rust Programming Language");
    }

    #[test]
    fn test_parse_brave_results_truncates() {
        let body = serde_json::json!({
            "web": {
                "results": [
                    {"title": "One", "url": "https://one.example", "description": "first"},
                    {"title": "Two", "url": "https://two.example", "description": "second"}
                ]
            }
        });
        let results = parse_brave_results(&body, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, "first");
    }

    #[test]
    fn test_parse_missing_results() {
        assert!(parse_searxng_results(&serde_json::json!({}), 5).is_empty());
    }

    #[test]
    fn test_from_config_requires_url() {
        let err = WebSearch::from_config(&SearchConfig::default()).err().unwrap();
        assert!(matches!(err, DelveError::Config(_)));

        let brave = WebSearch::new("https://api.search.brave.com/", Some("k".into())).unwrap();
        assert_eq!(brave.backend, Backend::Brave);
        assert_eq!(brave.base_url, "https://api.search.brave.com");
    }
}
