//! The research pipeline: web search, tiered fetch, per-document analysis,
//! and synthesis into one answer.

pub mod doc_agent;
pub mod orchestrator;
pub mod search;
pub mod synthesis;

pub use doc_agent::DocAgent;
pub use orchestrator::{
    FETCH_FAILED_ANALYSIS, NO_RESULTS_ANSWER, ResearchReport, ResearchSettings, Researcher, SourceAnalysis,
};
pub use search::{SearchProvider, SearchResult, WebSearch};
pub use synthesis::Synthesizer;
