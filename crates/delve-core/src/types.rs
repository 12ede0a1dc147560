use serde::{Deserialize, Serialize};

/// Conversation role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry of the conversation history.
///
/// Every `tool_calls` entry on an assistant message is answered by exactly one
/// tool message with the matching `tool_call_id` before the next assistant
/// message is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_content(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_content(Role::Tool, output)
        }
    }

    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Text content, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON text reassembled from streamed fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }

    /// Render as the tool-role message that answers the originating call.
    pub fn to_message(&self) -> Message {
        Message::tool(self.tool_call_id.clone(), self.output.clone())
    }
}

/// Function-style tool description sent alongside a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: serde_json::Value,
}

/// A row of the document cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub id: i64,
    pub link: String,
    pub text: String,
}

/// Which fetch strategy produced a cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    /// Direct HTTP request with a browser fingerprint.
    Get,
    /// Headless page render.
    Fetch,
    /// Stealth page render.
    StealthyFetch,
    Failed,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Get => "get",
            FetchMethod::Fetch => "fetch",
            FetchMethod::StealthyFetch => "stealthy_fetch",
            FetchMethod::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, FetchMethod::Failed)
    }
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the fetch pipeline for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Cache row holding the content or failure marker, absent only when the
    /// cache write itself failed.
    pub doc_id: Option<i64>,
    pub link: String,
    pub method: FetchMethod,
}

/// Scan backward for the most recent assistant message with non-empty content.
pub fn final_response(history: &[Message]) -> String {
    history
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| m.content.as_deref().filter(|c| !c.trim().is_empty()))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_omits_empty_fields() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_tool_result_to_message() {
        let result = ToolResult::error("call_1", "Tool 'nope' not found");
        let msg = result.to_message();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.text(), "Tool 'nope' not found");
    }

    #[test]
    fn test_final_response_skips_tool_messages() {
        let call = ToolCall {
            id: "c1".into(),
            name: "get_overview".into(),
            arguments: "{}".into(),
        };
        let history = vec![
            Message::user("q"),
            Message::assistant("Looking at the overview.", vec![call]),
            Message::tool("c1", "overview text"),
        ];
        assert_eq!(final_response(&history), "Looking at the overview.");
    }

    #[test]
    fn test_final_response_skips_empty_assistant_content() {
        let history = vec![
            Message::user("q"),
            Message::assistant("answer", vec![]),
            Message::assistant("  ", vec![]),
        ];
        assert_eq!(final_response(&history), "answer");
        assert_eq!(final_response(&[Message::user("q")]), "");
    }

    #[test]
    fn test_fetch_method_names() {
        assert_eq!(FetchMethod::Get.as_str(), "get");
        assert_eq!(FetchMethod::StealthyFetch.to_string(), "stealthy_fetch");
        assert!(!FetchMethod::Failed.is_success());
    }
}
