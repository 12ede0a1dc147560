//! Agent runtime: streamed generation rounds with concurrent tool execution.
//!
//! The [`StepEngine`] runs one round and hands back pending tool executions;
//! the [`Agent`] loop feeds their results back into the history until the
//! model stops calling tools or the iteration cap is hit. Progress is
//! reported as [`AgentEvent`]s on an optional channel.

use serde::{Deserialize, Serialize};

use delve_core::config::{AgentConfig, ModelConfig, model_name};
use delve_core::types::Message;

pub mod prompt;
pub mod runtime;
pub mod step;

pub use runtime::Agent;
pub use step::{CallState, PendingTool, StepEngine, StepResult};

/// Events emitted by the agent during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// Streaming text delta.
    #[serde(rename = "partial_reply")]
    PartialReply { delta: String },

    /// A tool call was closed and its execution started.
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        tool: String,
        arguments: String,
    },

    /// A tool call has completed.
    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        tool: String,
        content: String,
        is_error: bool,
    },

    /// Full assistant text of a round.
    #[serde(rename = "block_reply")]
    BlockReply { text: String, is_final: bool },

    #[serde(rename = "error")]
    Error { kind: String, message: String },
}

/// Knobs for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub max_iterations: u32,
    pub early_tool_execution: bool,
    pub max_concurrent_tools: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_iterations: 25,
            early_tool_execution: true,
            max_concurrent_tools: 8,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl AgentSettings {
    pub fn from_config(model: &ModelConfig, agent: &AgentConfig, max_iterations: u32) -> Self {
        Self {
            model: model.model.as_deref().map(model_name).unwrap_or_default().to_string(),
            max_iterations,
            early_tool_execution: agent.early_tool_execution,
            max_concurrent_tools: agent.max_concurrent_tools,
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Result of a completed agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    /// The full conversation, starting with the caller's messages.
    pub history: Vec<Message>,
    /// Generation rounds run.
    pub iterations: u32,
    /// Last non-empty assistant text, or empty.
    pub final_response: String,
    pub total_tool_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config_strips_provider() {
        let model = ModelConfig {
            model: Some("vllm:qwen3-32b".into()),
            temperature: Some(0.2),
            ..ModelConfig::default()
        };
        let settings = AgentSettings::from_config(&model, &AgentConfig::default(), 3);
        assert_eq!(settings.model, "qwen3-32b");
        assert_eq!(settings.max_iterations, 3);
        assert!(settings.early_tool_execution);
        assert_eq!(settings.temperature, Some(0.2));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AgentEvent::ToolCall {
            id: "c1".into(),
            tool: "get_headers".into(),
            arguments: "{}".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["tool"], "get_headers");
    }
}
