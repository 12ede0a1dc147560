//! In-process [`ChatClient`] that replays scripted deltas.
//!
//! Used to drive the agent loop and research pipeline without a model
//! server. A responder closure picks the script for each request, so
//! replies can depend on the conversation so far.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use delve_core::error::{DelveError, Result};
use delve_core::types::ToolCall;

use crate::{ChatClient, ChatRequest, ChatResponse, DeltaStream, RawDelta};

/// One scripted stream element.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Delta(RawDelta),
    /// Sleep before the next element.
    Pause(Duration),
}

pub type Script = Vec<ScriptStep>;

type Responder = dyn Fn(&ChatRequest, usize) -> Result<Script> + Send + Sync;

pub struct ScriptedClient {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    /// Build from a responder receiving the request and its zero-based call index.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<Script> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replay `turns` in order, one per request. Requests past the end fail
    /// with a connection error.
    pub fn from_turns(turns: Vec<Script>) -> Self {
        Self::new(move |_, index| {
            turns
                .get(index)
                .cloned()
                .ok_or_else(|| DelveError::Connection(format!("no scripted turn #{index}")))
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn script_for(&self, request: &ChatRequest) -> Result<Script> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        (self.responder)(request, index)
    }
}

/// A turn that streams `text` in word-sized deltas.
pub fn text_turn(text: &str) -> Script {
    text.split_inclusive(' ')
        .map(|piece| ScriptStep::Delta(RawDelta::text(piece)))
        .collect()
}

/// A turn that requests tool calls `(id, name, arguments)`, streaming each
/// call's arguments in small fragments the way servers do.
pub fn tool_call_turn(calls: &[(&str, &str, &str)]) -> Script {
    let mut script = Vec::new();
    for (id, name, arguments) in calls {
        script.push(ScriptStep::Delta(RawDelta::tool_call(Some(id), Some(name), "")));
        let chars: Vec<char> = arguments.chars().collect();
        for piece in chars.chunks(4) {
            let fragment: String = piece.iter().collect();
            script.push(ScriptStep::Delta(RawDelta::tool_call(None, None, &fragment)));
        }
    }
    script
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let script: VecDeque<ScriptStep> = self.script_for(request)?.into();
        let deltas = futures::stream::unfold(script, |mut script| async move {
            loop {
                match script.pop_front()? {
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Delta(delta) => return Some((Ok(delta), script)),
                }
            }
        });
        Ok(Box::pin(deltas))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let mut response = ChatResponse::default();
        let mut content = String::new();
        for step in self.script_for(request)? {
            let ScriptStep::Delta(delta) = step else {
                continue;
            };
            if let Some(text) = delta.content {
                content.push_str(&text);
            }
            if let Some(fragment) = delta.tool_call {
                match fragment.id {
                    Some(id) => response.tool_calls.push(ToolCall {
                        id,
                        name: fragment.name.unwrap_or_default(),
                        arguments: fragment.arguments.unwrap_or_default(),
                    }),
                    None => {
                        if let (Some(last), Some(args)) = (response.tool_calls.last_mut(), fragment.arguments) {
                            last.arguments.push_str(&args);
                        }
                    }
                }
            }
        }
        response.content = (!content.is_empty()).then_some(content);
        response.finish_reason = Some(if response.tool_calls.is_empty() { "stop" } else { "tool_calls" }.into());
        Ok(response)
    }
}
