//! Tool implementations for the agent runtime.
//!
//! Tools are capabilities exposed to the model during agent runs. Each tool
//! implements the [`Tool`] trait and declares its parameters explicitly; the
//! [`ToolRegistry`] builds JSON schemas from those declarations and turns
//! every kind of failure into an error [`ToolResult`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use delve_core::error::DelveError;
use delve_core::types::{ToolCall, ToolDefinition, ToolResult};

pub mod document;
pub mod markdown;

pub use document::{DocQuery, DocumentTool, all_document_tools, document_tools};
pub use markdown::MarkdownDocument;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamKind {
    fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
        }
    }

    /// Integers also accept numeric strings; some models quote them.
    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_str().is_some_and(|s| s.trim().parse::<i64>().is_ok())
            }
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParam {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Build the JSON schema for an arguments object from declared parameters.
pub fn parameters_schema(params: &[ToolParam]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|p| {
            (
                p.name.to_string(),
                json!({ "type": p.kind.as_str(), "description": p.description }),
            )
        })
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model (e.g., "get_overview").
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// Declared parameters. Defaults to none.
    fn params(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: parameters_schema(&self.params()),
        }
    }

    /// Execute the tool. Output is the text handed back to the model.
    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<String>;
}

/// Registry of available tools; also the executor for model tool calls.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions to offer alongside a completion request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Run one tool call. Never fails: lookup, argument, and execution
    /// errors come back as error results.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            let err = DelveError::ToolNotFound(call.name.clone());
            return ToolResult::error(&call.id, format!("Error: {err}"));
        };

        let params = match parse_arguments(tool.as_ref(), &call.arguments) {
            Ok(params) => params,
            Err(err) => {
                warn!(tool = %call.name, error = %err, "Rejected tool arguments");
                return ToolResult::error(&call.id, format!("Error: {err}"));
            }
        };

        info!(tool = %call.name, id = %call.id, "Executing tool");
        match tool.execute(params).await {
            Ok(output) => {
                debug!(tool = %call.name, bytes = output.len(), "Tool finished");
                ToolResult::ok(&call.id, output)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                let err = DelveError::ToolExecution {
                    tool: call.name.clone(),
                    reason: format!("{e:#}"),
                };
                ToolResult::error(&call.id, err.to_string())
            }
        }
    }
}

/// Parse raw argument text and check it against the declared parameters.
/// Empty text means "no arguments".
fn parse_arguments(tool: &dyn Tool, raw: &str) -> Result<serde_json::Value, DelveError> {
    let argument_error = |reason: String| DelveError::ToolArgument {
        tool: tool.name().to_string(),
        reason,
    };

    let value: serde_json::Value = if raw.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(raw).map_err(|e| argument_error(e.to_string()))?
    };
    let Some(object) = value.as_object() else {
        return Err(argument_error("arguments must be a JSON object".into()));
    };

    for param in tool.params() {
        match object.get(param.name) {
            Some(v) if !v.is_null() => {
                if !param.kind.accepts(v) {
                    return Err(argument_error(format!(
                        "'{}' must be of type {}",
                        param.name,
                        param.kind.as_str()
                    )));
                }
            }
            _ if param.required => {
                return Err(argument_error(format!("missing required parameter '{}'", param.name)));
            }
            _ => {}
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo a message back"
        }

        fn params(&self) -> Vec<ToolParam> {
            vec![
                ToolParam::required("message", ParamKind::String, "Text to echo"),
                ToolParam::optional("times", ParamKind::Integer, "Repeat count"),
            ]
        }

        async fn execute(&self, params: serde_json::Value) -> anyhow::Result<String> {
            let message = params["message"].as_str().unwrap_or_default();
            if message == "boom" {
                anyhow::bail!("echo exploded");
            }
            let times = params["times"].as_u64().unwrap_or(1) as usize;
            Ok(message.repeat(times))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn test_schema_from_params() {
        let def = EchoTool.definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["type"], "object");
        assert_eq!(def.parameters["properties"]["message"]["type"], "string");
        assert_eq!(def.parameters["properties"]["times"]["type"], "integer");
        assert_eq!(def.parameters["required"], json!(["message"]));
    }

    #[test]
    fn test_schema_without_params() {
        let schema = parameters_schema(&[]);
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.list(), vec!["echo"]);
        assert_eq!(registry.definitions().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let result = registry().execute(&call("echo", r#"{"message":"hi","times":2}"#)).await;
        assert!(!result.is_error);
        assert_eq!(result.output, "hihi");
        assert_eq!(result.tool_call_id, "call_1");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let result = registry().execute(&call("missing", "{}")).await;
        assert!(result.is_error);
        assert_eq!(result.output, "Error: Tool 'missing' not found");
    }

    #[tokio::test]
    async fn test_bad_json_is_error_result() {
        let result = registry().execute(&call("echo", r#"{"message": "#)).await;
        assert!(result.is_error);
        assert!(result.output.contains("Invalid arguments for tool 'echo'"));
    }

    #[tokio::test]
    async fn test_missing_required_param() {
        let result = registry().execute(&call("echo", "")).await;
        assert!(result.is_error);
        assert!(result.output.contains("missing required parameter 'message'"));
    }

    #[tokio::test]
    async fn test_wrong_param_type() {
        let result = registry().execute(&call("echo", r#"{"message": 5}"#)).await;
        assert!(result.is_error);
        assert!(result.output.contains("'message' must be of type string"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let result = registry().execute(&call("echo", r#"{"message":"boom"}"#)).await;
        assert!(result.is_error);
        assert_eq!(result.output, "Error executing tool 'echo': echo exploded");
    }

    #[test]
    fn test_integer_accepts_numeric_string() {
        assert!(ParamKind::Integer.accepts(&json!(12)));
        assert!(ParamKind::Integer.accepts(&json!("12")));
        assert!(!ParamKind::Integer.accepts(&json!("twelve")));
        assert!(!ParamKind::Integer.accepts(&json!(1.5)));
    }
}
