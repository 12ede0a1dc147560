//! Read-only structural query tools bound to one markdown document.

use std::sync::Arc;

use async_trait::async_trait;

use crate::markdown::MarkdownDocument;
use crate::{ParamKind, Tool, ToolParam};

/// Which structural query a [`DocumentTool`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocQuery {
    Overview,
    Intro,
    Headers,
    HeaderByLine,
    TablesMetadata,
    TableByLine,
    Paragraphs,
    Lists,
    CodeBlocks,
    Links,
}

impl DocQuery {
    /// The six queries a document analyst is given.
    pub const ANALYSIS: [DocQuery; 6] = [
        DocQuery::Overview,
        DocQuery::Intro,
        DocQuery::Headers,
        DocQuery::TablesMetadata,
        DocQuery::TableByLine,
        DocQuery::HeaderByLine,
    ];

    pub const ALL: [DocQuery; 10] = [
        DocQuery::Overview,
        DocQuery::Intro,
        DocQuery::Headers,
        DocQuery::TablesMetadata,
        DocQuery::TableByLine,
        DocQuery::HeaderByLine,
        DocQuery::Paragraphs,
        DocQuery::Lists,
        DocQuery::CodeBlocks,
        DocQuery::Links,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DocQuery::Overview => "get_overview",
            DocQuery::Intro => "get_intro",
            DocQuery::Headers => "get_headers",
            DocQuery::HeaderByLine => "get_header_by_line",
            DocQuery::TablesMetadata => "get_tables_metadata",
            DocQuery::TableByLine => "get_table_by_line",
            DocQuery::Paragraphs => "get_paragraphs",
            DocQuery::Lists => "get_lists",
            DocQuery::CodeBlocks => "get_code_blocks",
            DocQuery::Links => "get_links",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DocQuery::Overview => {
                "Get a complete overview of the document: title, introduction, \
                 section outline with line numbers, and content statistics."
            }
            DocQuery::Intro => {
                "Extract the introduction, abstract, or summary of the document."
            }
            DocQuery::Headers => "List all headers with their level and line number.",
            DocQuery::HeaderByLine => {
                "Get the full content of the section whose header is at the given line number."
            }
            DocQuery::TablesMetadata => {
                "List all tables with their line number, size, and column headers."
            }
            DocQuery::TableByLine => "Get the full contents of the table at the given line number.",
            DocQuery::Paragraphs => "List all paragraphs with their line numbers.",
            DocQuery::Lists => "List all ordered and unordered lists with their items.",
            DocQuery::CodeBlocks => "List all code blocks with language and line range.",
            DocQuery::Links => "List all external HTTP links with their line numbers.",
        }
    }

    fn params(&self) -> Vec<ToolParam> {
        match self {
            DocQuery::HeaderByLine => vec![ToolParam::required(
                "line_number",
                ParamKind::Integer,
                "Line number of the header, as reported by get_headers or get_overview",
            )],
            DocQuery::TableByLine => vec![ToolParam::required(
                "line_number",
                ParamKind::Integer,
                "Line number of the table, as reported by get_tables_metadata",
            )],
            _ => Vec::new(),
        }
    }

    fn run(&self, doc: &MarkdownDocument, params: &serde_json::Value) -> anyhow::Result<String> {
        Ok(match self {
            DocQuery::Overview => doc.get_overview(),
            DocQuery::Intro => doc.get_intro()?,
            DocQuery::Headers => doc.get_headers()?,
            DocQuery::HeaderByLine => doc.get_header_by_line(line_number(params)?)?,
            DocQuery::TablesMetadata => doc.get_tables_metadata(),
            DocQuery::TableByLine => doc.get_table_by_line(line_number(params)?),
            DocQuery::Paragraphs => doc.get_paragraphs()?,
            DocQuery::Lists => doc.get_lists()?,
            DocQuery::CodeBlocks => doc.get_code_blocks()?,
            DocQuery::Links => doc.get_links()?,
        })
    }
}

fn line_number(params: &serde_json::Value) -> anyhow::Result<usize> {
    let value = &params["line_number"];
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| anyhow::anyhow!("line_number must be a non-negative integer"))
}

/// One structural query over a shared document.
pub struct DocumentTool {
    doc: Arc<MarkdownDocument>,
    query: DocQuery,
}

impl DocumentTool {
    pub fn new(doc: Arc<MarkdownDocument>, query: DocQuery) -> Self {
        Self { doc, query }
    }
}

#[async_trait]
impl Tool for DocumentTool {
    fn name(&self) -> &str {
        self.query.name()
    }

    fn description(&self) -> &str {
        self.query.description()
    }

    fn params(&self) -> Vec<ToolParam> {
        self.query.params()
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<String> {
        // Query failures are reported to the model as text, not tool errors.
        Ok(self
            .query
            .run(&self.doc, &params)
            .unwrap_or_else(|e| format!("Analysis failed: {e}")))
    }
}

/// The analyst tool set for one document.
pub fn document_tools(doc: Arc<MarkdownDocument>) -> Vec<Arc<dyn Tool>> {
    tools_for(doc, &DocQuery::ANALYSIS)
}

/// Every structural query tool for one document.
pub fn all_document_tools(doc: Arc<MarkdownDocument>) -> Vec<Arc<dyn Tool>> {
    tools_for(doc, &DocQuery::ALL)
}

fn tools_for(doc: Arc<MarkdownDocument>, queries: &[DocQuery]) -> Vec<Arc<dyn Tool>> {
    queries
        .iter()
        .map(|q| Arc::new(DocumentTool::new(doc.clone(), *q)) as Arc<dyn Tool>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;
    use delve_core::types::ToolCall;

    fn registry() -> ToolRegistry {
        let doc = Arc::new(MarkdownDocument::parse(
            "# Guide\n\nShort intro.\n\n## Install\n\nRun the installer.\n",
        ));
        ToolRegistry::from_tools(document_tools(doc))
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "c".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn test_analysis_tool_set() {
        let registry = registry();
        assert_eq!(
            registry.list(),
            vec![
                "get_overview",
                "get_intro",
                "get_headers",
                "get_tables_metadata",
                "get_table_by_line",
                "get_header_by_line"
            ]
        );
        let defs = registry.definitions();
        let by_line = defs.iter().find(|d| d.name == "get_header_by_line").unwrap();
        assert_eq!(by_line.parameters["required"], serde_json::json!(["line_number"]));
    }

    #[test]
    fn test_all_tools_has_extras() {
        let doc = Arc::new(MarkdownDocument::parse("# T"));
        let names: Vec<String> = all_document_tools(doc).iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"get_links".to_string()));
    }

    #[tokio::test]
    async fn test_header_by_line_via_registry() {
        let result = registry()
            .execute(&call("get_header_by_line", r#"{"line_number": 5}"#))
            .await;
        assert!(!result.is_error);
        assert!(result.output.contains("Run the installer."));
    }

    #[tokio::test]
    async fn test_quoted_line_number_accepted() {
        let result = registry()
            .execute(&call("get_header_by_line", r#"{"line_number": "1"}"#))
            .await;
        assert!(!result.is_error);
        assert!(result.output.contains("\"text\": \"Guide\""));
    }

    #[tokio::test]
    async fn test_missing_line_number_rejected() {
        let result = registry().execute(&call("get_table_by_line", "{}")).await;
        assert!(result.is_error);
        assert!(result.output.contains("line_number"));
    }

    #[tokio::test]
    async fn test_negative_line_number_reports_analysis_failure() {
        let result = registry()
            .execute(&call("get_table_by_line", r#"{"line_number": -3}"#))
            .await;
        assert!(!result.is_error);
        assert!(result.output.starts_with("Analysis failed:"));
    }
}
