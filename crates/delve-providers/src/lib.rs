//! Chat-completions stream client and delta normalization.
//!
//! A [`ChatClient`] opens one streaming exchange per generation round and
//! yields [`RawDelta`]s; [`normalize`] turns those into the two event kinds
//! the step engine consumes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use delve_core::error::Result;
use delve_core::types::{Message, ToolCall, ToolDefinition};

pub mod normalize;
pub mod openai;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod sse;

pub use normalize::{GenEvent, normalize, normalize_delta};
pub use openai::OpenAiClient;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{Script, ScriptStep, ScriptedClient, text_turn, tool_call_turn};

/// One generation request: the full history plus any offered tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A single `choices[0].delta` from the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    /// First entry of the delta's `tool_calls`, if any.
    pub tool_call: Option<ToolCallFragment>,
    pub finish_reason: Option<String>,
}

impl RawDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(id: Option<&str>, name: Option<&str>, arguments: &str) -> Self {
        Self {
            tool_call: Some(ToolCallFragment {
                index: 0,
                id: id.map(str::to_string),
                name: name.map(str::to_string),
                arguments: Some(arguments.to_string()),
            }),
            ..Self::default()
        }
    }
}

/// Streamed piece of a tool call. `id` and `name` usually appear only on the
/// first fragment of a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A complete, non-streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<RawDelta>> + Send>>;

/// A chat-completions endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Client identifier (e.g., "openai").
    fn id(&self) -> &str;

    /// Open a streaming exchange. Fails with a connection error if the
    /// endpoint is unreachable or answers with a non-success status.
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream>;

    /// Issue one non-streaming request.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Issue independent non-streaming requests concurrently. One failing
    /// request does not affect the others.
    async fn batch(&self, requests: &[ChatRequest]) -> Vec<Result<ChatResponse>> {
        futures::future::join_all(requests.iter().map(|r| self.complete(r))).await
    }
}
