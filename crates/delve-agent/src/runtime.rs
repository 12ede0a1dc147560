//! Agent loop: alternate generation rounds and tool results.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use delve_core::error::{DelveError, Result};
use delve_core::types::{Message, final_response};
use delve_providers::ChatClient;
use delve_tools::ToolRegistry;

use crate::step::StepEngine;
use crate::{AgentEvent, AgentResult, AgentSettings};

pub struct Agent {
    engine: StepEngine,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(client: Arc<dyn ChatClient>, tools: ToolRegistry, settings: AgentSettings) -> Self {
        Self {
            engine: StepEngine::new(client, Arc::new(tools), settings),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until a round requests no tools or the iteration cap is reached.
    ///
    /// Every tool call of a round is answered in the history before the next
    /// round starts, including on the last allowed round. Connection and
    /// malformed-stream errors end the run; tool failures do not.
    pub async fn run(&self, mut history: Vec<Message>) -> Result<AgentResult> {
        let max_iterations = self.engine.settings().max_iterations;
        let mut iterations = 0;
        let mut total_tool_calls = 0;

        for iteration in 0..max_iterations {
            if self.cancel.is_cancelled() {
                return Err(DelveError::Cancelled);
            }
            debug!(iteration, "Agent loop iteration");
            iterations += 1;

            let mut step = match self.engine.step(&history, self.events.as_ref(), &self.cancel).await {
                Ok(step) => step,
                Err(e) => {
                    error!(%e, iteration, "Generation round failed");
                    self.emit(AgentEvent::Error {
                        kind: error_kind(&e).into(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let text = step.message.text().to_string();
            let done = !step.has_tool_calls();
            history.push(step.message.clone());
            if !text.is_empty() || done {
                self.emit(AgentEvent::BlockReply { text, is_final: done });
            }
            if done {
                break;
            }

            total_tool_calls += step.tool_calls.len();
            let results = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DelveError::Cancelled),
                results = step.tool_results() => results,
            };
            for (call, result) in step.tool_calls.iter().zip(&results) {
                self.emit(AgentEvent::ToolResult {
                    id: result.tool_call_id.clone(),
                    tool: call.name.clone(),
                    content: result.output.clone(),
                    is_error: result.is_error,
                });
                history.push(result.to_message());
            }

            if iteration + 1 == max_iterations {
                info!(max_iterations, "Iteration cap reached");
            }
        }

        let final_response = final_response(&history);
        info!(iterations, total_tool_calls, "Agent run finished");
        Ok(AgentResult {
            history,
            iterations,
            final_response,
            total_tool_calls,
        })
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn error_kind(e: &DelveError) -> &'static str {
    match e {
        DelveError::Connection(_) => "connection",
        DelveError::MalformedDelta(_) => "malformed_delta",
        DelveError::Cancelled => "cancelled",
        _ => "other",
    }
}
