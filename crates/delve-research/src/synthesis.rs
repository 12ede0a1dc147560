//! Final, tool-free merge of per-source analyses.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use delve_agent::prompt::{build_synthesis_prompt, synthesis_request};
use delve_agent::{Agent, AgentSettings};
use delve_core::error::Result;
use delve_core::types::Message;
use delve_providers::ChatClient;
use delve_tools::ToolRegistry;

pub struct Synthesizer {
    client: Arc<dyn ChatClient>,
    settings: AgentSettings,
    cancel: CancellationToken,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn ChatClient>, settings: AgentSettings) -> Self {
        Self {
            client,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Merge `(link, analysis)` pairs into one answer to `query`.
    pub async fn synthesize(&self, query: &str, analyses: &[(String, String)]) -> Result<String> {
        let history = vec![
            Message::system(build_synthesis_prompt()),
            Message::user(synthesis_request(query, analyses)),
        ];
        info!(sources = analyses.len(), "Synthesizing analyses");
        let agent = Agent::new(self.client.clone(), ToolRegistry::new(), self.settings.clone())
            .with_cancellation(self.cancel.child_token());
        let result = agent.run(history).await?;
        Ok(result.final_response)
    }
}
