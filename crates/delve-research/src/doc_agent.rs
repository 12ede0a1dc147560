//! Per-document analyst: an agent bound to one cached document's query tools.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use delve_agent::prompt::{build_doc_agent_prompt, doc_agent_request};
use delve_agent::{Agent, AgentSettings};
use delve_core::error::Result;
use delve_core::types::Message;
use delve_fetch::DocumentCache;
use delve_providers::ChatClient;
use delve_tools::{MarkdownDocument, ToolRegistry, document_tools};

pub struct DocAgent {
    client: Arc<dyn ChatClient>,
    cache: Arc<DocumentCache>,
    settings: AgentSettings,
    cancel: CancellationToken,
}

impl DocAgent {
    pub fn new(client: Arc<dyn ChatClient>, cache: Arc<DocumentCache>, settings: AgentSettings) -> Self {
        Self {
            client,
            cache,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The registry an analysis of `doc_id` runs with.
    ///
    /// Fails with a cache error when the row is missing or blank.
    pub fn tools_for(&self, doc_id: i64) -> Result<ToolRegistry> {
        let doc = self.cache.require(doc_id)?;
        let markdown = Arc::new(MarkdownDocument::parse(doc.text));
        Ok(ToolRegistry::from_tools(document_tools(markdown)))
    }

    /// Analyze one cached document against `query` and return the analysis text.
    pub async fn analyze(&self, doc_id: i64, query: &str) -> Result<String> {
        let tools = self.tools_for(doc_id)?;
        let history = vec![
            Message::system(build_doc_agent_prompt(doc_id, query, &tools)),
            Message::user(doc_agent_request(doc_id, query)),
        ];

        info!(doc_id, "Document analysis started");
        let agent = Agent::new(self.client.clone(), tools, self.settings.clone())
            .with_cancellation(self.cancel.child_token());
        let result = agent.run(history).await?;
        info!(
            doc_id,
            iterations = result.iterations,
            tool_calls = result.total_tool_calls,
            "Document analysis finished"
        );
        Ok(result.final_response)
    }
}
