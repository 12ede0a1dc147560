//! Search, fetch, analyze, synthesize.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use delve_agent::AgentSettings;
use delve_core::config::{AgentConfig, ModelConfig};
use delve_core::error::Result;
use delve_core::types::{FetchMethod, FetchOutcome};
use delve_fetch::FetchPipeline;
use delve_providers::ChatClient;

use crate::doc_agent::DocAgent;
use crate::search::{SearchProvider, SearchResult};
use crate::synthesis::Synthesizer;

pub const NO_RESULTS_ANSWER: &str = "No search results found for the query.";
pub const FETCH_FAILED_ANALYSIS: &str = "Failed to fetch content from this URL.";

/// One source as it reached the synthesis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAnalysis {
    pub link: String,
    pub title: String,
    pub doc_id: Option<i64>,
    pub method: FetchMethod,
    pub analysis: String,
}

/// Everything a research run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceAnalysis>,
}

/// Iteration caps for the two agent roles.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSettings {
    pub max_results: usize,
    pub doc_agent: AgentSettings,
    pub synthesis: AgentSettings,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_results: 4,
            doc_agent: AgentSettings::default().with_max_iterations(25),
            synthesis: AgentSettings::default().with_max_iterations(3),
        }
    }
}

impl ResearchSettings {
    pub fn from_config(model: &ModelConfig, agent: &AgentConfig, max_results: usize) -> Self {
        Self {
            max_results,
            doc_agent: AgentSettings::from_config(model, agent, agent.doc_max_iterations),
            synthesis: AgentSettings::from_config(model, agent, agent.synthesis_max_iterations),
        }
    }
}

/// Drives a full research run. Owns no global state; the model client,
/// search backend and fetch pipeline are all handed in.
pub struct Researcher {
    client: Arc<dyn ChatClient>,
    search: Arc<dyn SearchProvider>,
    pipeline: Arc<FetchPipeline>,
    settings: ResearchSettings,
    cancel: CancellationToken,
}

impl Researcher {
    pub fn new(
        client: Arc<dyn ChatClient>,
        search: Arc<dyn SearchProvider>,
        pipeline: Arc<FetchPipeline>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            client,
            search,
            pipeline,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the pipeline and return only the answer.
    pub async fn answer(&self, query: &str) -> Result<String> {
        Ok(self.research(query).await?.answer)
    }

    /// Run the pipeline for `query`.
    ///
    /// Per-URL fetch failures and per-document analysis failures are folded
    /// into the report. Search and synthesis failures are returned.
    pub async fn research(&self, query: &str) -> Result<ResearchReport> {
        info!(query, max_results = self.settings.max_results, "Searching");
        let mut results = self.search.search(query, self.settings.max_results).await?;
        results.truncate(self.settings.max_results);
        if results.is_empty() {
            info!(query, "Search returned no results");
            return Ok(ResearchReport {
                query: query.to_string(),
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }
        info!(count = results.len(), "Search returned results");

        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let outcomes = self.pipeline.fetch_all(&urls).await;

        let doc_agent = DocAgent::new(
            self.client.clone(),
            self.pipeline.cache().clone(),
            self.settings.doc_agent.clone(),
        )
        .with_cancellation(self.cancel.clone());
        let analyses = join_all(
            outcomes
                .iter()
                .map(|outcome| analyze_outcome(&doc_agent, outcome, query)),
        )
        .await;

        let sources: Vec<SourceAnalysis> = results
            .into_iter()
            .zip(outcomes)
            .zip(analyses)
            .map(|((result, outcome), analysis)| source_analysis(result, outcome, analysis))
            .collect();

        let pairs: Vec<(String, String)> = sources
            .iter()
            .map(|s| (s.link.clone(), s.analysis.clone()))
            .collect();
        let answer = Synthesizer::new(self.client.clone(), self.settings.synthesis.clone())
            .with_cancellation(self.cancel.clone())
            .synthesize(query, &pairs)
            .await?;

        Ok(ResearchReport {
            query: query.to_string(),
            answer,
            sources,
        })
    }
}

async fn analyze_outcome(doc_agent: &DocAgent, outcome: &FetchOutcome, query: &str) -> String {
    let doc_id = match outcome.doc_id {
        Some(id) if outcome.method.is_success() => id,
        _ => return FETCH_FAILED_ANALYSIS.to_string(),
    };
    match doc_agent.analyze(doc_id, query).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!(doc_id, url = %outcome.link, error = %e, "Document analysis failed");
            format!("Analysis failed: {e}")
        }
    }
}

fn source_analysis(result: SearchResult, outcome: FetchOutcome, analysis: String) -> SourceAnalysis {
    SourceAnalysis {
        link: outcome.link,
        title: result.title,
        doc_id: outcome.doc_id,
        method: outcome.method,
        analysis,
    }
}
