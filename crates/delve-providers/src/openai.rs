//! OpenAI-compatible Chat Completions client.
//!
//! Streams `/v1/chat/completions` from any server speaking the OpenAI wire
//! dialect (vLLM, OpenAI, OpenRouter, Ollama, ...).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace, warn};

use delve_core::config::ModelConfig;
use delve_core::error::{DelveError, Result};
use delve_core::types::{Message, Role, ToolCall, ToolDefinition};

use crate::sse::{SseEvent, parse_sse_response};
use crate::{ChatClient, ChatRequest, ChatResponse, DeltaStream, RawDelta, ToolCallFragment, Usage};

pub struct OpenAiClient {
    pub base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DelveError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            client,
        })
    }

    pub fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    pub fn format_messages(&self, history: &[Message]) -> Vec<serde_json::Value> {
        history
            .iter()
            .map(|message| {
                let mut msg = json!({ "role": message.role.as_str() });
                match message.role {
                    Role::Assistant => {
                        // Assistant turns that only call tools carry null content.
                        msg["content"] = match message.content.as_deref() {
                            Some(text) if !text.is_empty() => json!(text),
                            _ => serde_json::Value::Null,
                        };
                        if !message.tool_calls.is_empty() {
                            let calls: Vec<serde_json::Value> = message
                                .tool_calls
                                .iter()
                                .map(|tc| {
                                    json!({
                                        "id": tc.id,
                                        "type": "function",
                                        "function": {
                                            "name": tc.name,
                                            "arguments": tc.arguments,
                                        }
                                    })
                                })
                                .collect();
                            msg["tool_calls"] = json!(calls);
                        }
                    }
                    Role::Tool => {
                        msg["content"] = json!(message.text());
                        msg["tool_call_id"] = json!(message.tool_call_id.as_deref().unwrap_or(""));
                    }
                    Role::System | Role::User => {
                        msg["content"] = json!(message.text());
                    }
                }
                msg
            })
            .collect()
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: request.model.clone(),
            messages: self.format_messages(&request.messages),
            max_tokens: request.max_tokens,
            stream,
            temperature: request.temperature,
            tools: (!request.tools.is_empty()).then(|| self.format_tools(&request.tools)),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post(&self, body: &OpenAiRequest) -> Result<reqwest::Response> {
        let mut req_builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("authorization", format!("Bearer {api_key}"));
        }

        let response = req_builder
            .json(body)
            .send()
            .await
            .map_err(|e| DelveError::Connection(format!("{}: {e}", self.base_url)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DelveError::Connection(format!(
                "Chat completions error {status}: {body}"
            )));
        }
        Ok(response)
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ChunkChoice {
    fn into_raw_delta(self) -> RawDelta {
        let tool_call = self
            .delta
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .map(|tc| {
                let function = tc.function.unwrap_or_default();
                ToolCallFragment {
                    index: tc.index,
                    id: tc.id,
                    name: function.name,
                    arguments: function.arguments,
                }
            });
        RawDelta {
            role: self.delta.role,
            content: self.delta.content,
            tool_call,
            finish_reason: self.finish_reason,
        }
    }
}

/// Map one SSE event to a delta. `Ok(None)` means "skip"; the caller checks
/// for the `[DONE]` marker before calling.
fn parse_chunk(event: &SseEvent) -> Result<Option<RawDelta>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(event.data.trim()).map_err(|e| {
        DelveError::MalformedDelta(format!("unparseable chunk ({e}): {}", event.data))
    })?;
    // Usage-only chunks (stream_options.include_usage) have no choices.
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(ChunkChoice::into_raw_delta))
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn id(&self) -> &str {
        "openai"
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let body = self.build_body(request, true);
        debug!(model = %body.model, base_url = %self.base_url, "Streaming chat completion");

        let response = self.post(&body).await?;
        let sse = Box::pin(parse_sse_response(response));

        let deltas = futures::stream::unfold(sse, |mut sse| async move {
            loop {
                match sse.next().await? {
                    Ok(event) => {
                        if event.data.trim() == "[DONE]" {
                            return None;
                        }
                        match parse_chunk(&event) {
                            Ok(Some(delta)) => return Some((Ok(delta), sse)),
                            Ok(None) => {
                                trace!("Skipping chunk without choices");
                                continue;
                            }
                            Err(e) => return Some((Err(e), sse)),
                        }
                    }
                    Err(e) => {
                        // The SSE layer ends after yielding a transport error.
                        warn!(error = %e, "Chat stream interrupted");
                        return Some((Err(e), sse));
                    }
                }
            }
        });

        Ok(Box::pin(deltas))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(request, false);
        debug!(model = %body.model, base_url = %self.base_url, "Requesting chat completion");

        let response = self.post(&body).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DelveError::Connection(format!("invalid completion response: {e}")))?;

        let usage = parsed.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(ChatResponse {
                usage,
                ..ChatResponse::default()
            });
        };
        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
