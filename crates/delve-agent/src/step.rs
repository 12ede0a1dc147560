//! One generation round: stream a response, reassemble tool calls, and
//! start their execution.
//!
//! Tool-call fragments arrive in order and only the first fragment of a call
//! carries its id. [`CallState`] tracks the call being assembled; a fragment
//! with a new id closes it. With early execution enabled a closed call is
//! spawned at once, so tools run while the model is still streaming.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use delve_core::error::{DelveError, Result};
use delve_core::types::{Message, ToolCall, ToolResult};
use delve_providers::{ChatClient, ChatRequest, GenEvent, normalize};
use delve_tools::ToolRegistry;

use crate::{AgentEvent, AgentSettings};

/// Assembly state for streamed tool-call fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallState {
    #[default]
    NoOpenCall,
    OpenCall {
        id: String,
        name: String,
        arguments: String,
    },
}

impl CallState {
    /// Feed one fragment. Returns the previous call when this fragment
    /// starts a new one.
    pub fn advance(
        &mut self,
        id: Option<String>,
        name: Option<String>,
        fragment: &str,
    ) -> Result<Option<ToolCall>> {
        match (std::mem::take(self), id) {
            (CallState::NoOpenCall, None) => Err(DelveError::MalformedDelta(
                "tool-call fragment without an id and no call in progress".into(),
            )),
            (CallState::NoOpenCall, Some(id)) => {
                *self = CallState::OpenCall {
                    id,
                    name: name.unwrap_or_default(),
                    arguments: fragment.to_string(),
                };
                Ok(None)
            }
            (
                CallState::OpenCall {
                    id: open_id,
                    name: open_name,
                    mut arguments,
                },
                next_id,
            ) => match next_id {
                Some(next) if next != open_id => {
                    *self = CallState::OpenCall {
                        id: next,
                        name: name.unwrap_or_default(),
                        arguments: fragment.to_string(),
                    };
                    Ok(Some(ToolCall {
                        id: open_id,
                        name: open_name,
                        arguments,
                    }))
                }
                _ => {
                    arguments.push_str(fragment);
                    *self = CallState::OpenCall {
                        id: open_id,
                        name: if open_name.is_empty() {
                            name.unwrap_or_default()
                        } else {
                            open_name
                        },
                        arguments,
                    };
                    Ok(None)
                }
            },
        }
    }

    /// Close the open call at end of stream.
    pub fn finish(&mut self) -> Option<ToolCall> {
        std::mem::take(self).into_call()
    }

    fn into_call(self) -> Option<ToolCall> {
        match self {
            CallState::NoOpenCall => None,
            CallState::OpenCall {
                id,
                name,
                arguments,
            } => Some(ToolCall {
                id,
                name,
                arguments,
            }),
        }
    }
}

/// A tool call whose execution is in flight. Dropping it aborts the task.
#[derive(Debug)]
pub struct PendingTool {
    call: ToolCall,
    handle: JoinHandle<ToolResult>,
}

impl PendingTool {
    pub fn call(&self) -> &ToolCall {
        &self.call
    }

    /// Wait for the result. A panicked or aborted task becomes an error result.
    pub async fn wait(&mut self) -> ToolResult {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => {
                let reason = if e.is_panic() { "tool panicked" } else { "tool task was cancelled" };
                warn!(tool = %self.call.name, id = %self.call.id, reason, "Tool task failed");
                let err = DelveError::ToolExecution {
                    tool: self.call.name.clone(),
                    reason: reason.into(),
                };
                ToolResult::error(&self.call.id, err.to_string())
            }
        }
    }
}

impl Drop for PendingTool {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Outcome of one round.
#[derive(Debug)]
pub struct StepResult {
    /// The assistant message with its content and requested tool calls.
    pub message: Message,
    /// Every requested call, in stream order.
    pub tool_calls: Vec<ToolCall>,
    /// Executions for `tool_calls`, index-aligned.
    pub pending: Vec<PendingTool>,
}

impl StepResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn pending_ids(&self) -> Vec<&str> {
        self.pending.iter().map(|p| p.call.id.as_str()).collect()
    }

    /// Await every pending execution and return the results in call order,
    /// regardless of completion order.
    pub async fn tool_results(&mut self) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(self.pending.len());
        for pending in &mut self.pending {
            results.push(pending.wait().await);
        }
        results
    }
}

/// Runs generation rounds against one client with one tool set.
pub struct StepEngine {
    client: Arc<dyn ChatClient>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    limiter: Arc<Semaphore>,
}

impl StepEngine {
    pub fn new(client: Arc<dyn ChatClient>, tools: Arc<ToolRegistry>, settings: AgentSettings) -> Self {
        let limiter = Arc::new(Semaphore::new(settings.max_concurrent_tools.max(1)));
        Self {
            client,
            tools,
            settings,
            limiter,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one round over `history`. Stream failures are fatal; on error or
    /// cancellation every started tool task is aborted.
    pub async fn step(
        &self,
        history: &[Message],
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> Result<StepResult> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: history.to_vec(),
            tools: self.tools.definitions(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DelveError::Cancelled),
            opened = self.client.stream(&request) => opened?,
        };
        let mut stream = normalize(raw);

        let mut content = String::new();
        let mut state = CallState::default();
        let mut tool_calls = Vec::new();
        let mut pending = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DelveError::Cancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else {
                break;
            };
            match event? {
                GenEvent::AssistantResponse { content: delta } => {
                    content.push_str(&delta);
                    if let Some(tx) = events {
                        let _ = tx.send(AgentEvent::PartialReply { delta });
                    }
                }
                GenEvent::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    if let Some(call) = state.advance(id, name, &arguments)? {
                        if self.settings.early_tool_execution {
                            pending.push(self.spawn(&call, events));
                        }
                        tool_calls.push(call);
                    }
                }
            }
        }

        if let Some(call) = state.finish() {
            tool_calls.push(call);
        }
        for call in &tool_calls[pending.len()..] {
            pending.push(self.spawn(call, events));
        }
        debug!(
            calls = tool_calls.len(),
            chars = content.len(),
            "Generation round finished"
        );

        Ok(StepResult {
            message: Message::assistant(content, tool_calls.clone()),
            tool_calls,
            pending,
        })
    }

    fn spawn(&self, call: &ToolCall, events: Option<&mpsc::UnboundedSender<AgentEvent>>) -> PendingTool {
        if let Some(tx) = events {
            let _ = tx.send(AgentEvent::ToolCall {
                id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }
        debug!(tool = %call.name, id = %call.id, "Starting tool");

        let tools = self.tools.clone();
        let limiter = self.limiter.clone();
        let task_call = call.clone();
        let handle = tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await;
            tools.execute(&task_call).await
        });
        PendingTool {
            call: call.clone(),
            handle,
        }
    }
}
