//! System prompts for the document analyst and the synthesizer.

use delve_tools::ToolRegistry;

/// Prompt for an analyst bound to one cached document.
///
/// Lists the tools actually registered, so the prompt never advertises a
/// tool the model cannot call.
pub fn build_doc_agent_prompt(doc_id: i64, query: &str, tools: &ToolRegistry) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "You are a document analysis expert working over markdown content stored in a database.\n\n\
         Database ID {doc_id} holds a document fetched from the web. Analyze it and answer \
         the user's query accurately and completely.\n\nUser query:\n\"{query}\""
    ));
    parts.push(current_date());

    parts.push(
        "MANDATORY TOOL USAGE RULES\n\
         - You MUST use the provided document tools.\n\
         - Do NOT answer from prior knowledge or assumptions.\n\
         - Every claim must be grounded in content returned by a tool.\n\n\
         Workflow:\n\
         1. Start with `get_overview` or `get_headers` to learn the document structure.\n\
         2. Identify the sections and tables relevant to the query.\n\
         3. Use `get_header_by_line` and `get_table_by_line` to extract exact evidence.\n\
         4. Combine the findings into a clear, structured answer.\n\
         5. If information is missing, say so explicitly instead of guessing."
            .to_string(),
    );

    let definitions = tools.definitions();
    if !definitions.is_empty() {
        let listing: Vec<String> = definitions
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect();
        parts.push(format!("AVAILABLE TOOLS\n{}", listing.join("\n")));
    }

    parts.push(
        "FINAL OUTPUT\n\
         Prefer precise extraction over loose summary. Inspect tables before concluding when \
         they exist. Base every statement on extracted content, and state plainly when the \
         document does not contain enough information."
            .to_string(),
    );

    parts.join("\n\n")
}

/// User turn that starts a document analysis.
pub fn doc_agent_request(doc_id: i64, query: &str) -> String {
    format!("Analyze the content in database ID {doc_id} and extract information relevant to: {query}")
}

pub fn build_synthesis_prompt() -> String {
    let parts = [
        "You are a synthesis expert. You receive analyses of several web sources and must \
         combine them into one comprehensive, coherent answer."
            .to_string(),
        current_date(),
        "Your task:\n\
         1. Identify the key information from each source.\n\
         2. Find common themes and patterns.\n\
         3. Resolve contradictions between sources.\n\
         4. Write a well-structured, informative answer.\n\
         5. Cite the source link when making a specific claim.\n\n\
         Ignore sources whose analysis reports a fetch or analysis failure."
            .to_string(),
    ];
    parts.join("\n\n")
}

/// User turn for synthesis: the query plus every `(link, analysis)` pair.
pub fn synthesis_request(query: &str, analyses: &[(String, String)]) -> String {
    let context = analyses
        .iter()
        .map(|(link, analysis)| format!("SOURCE: {link}\nANALYSIS:\n{analysis}\n---"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Original Query: {query}\n\n\
         Here are the analyses from {} different sources:\n\n\
         {context}\n\n\
         Please synthesize these analyses into a comprehensive answer to the query.",
        analyses.len()
    )
}

fn current_date() -> String {
    format!("Current date: {}", chrono::Utc::now().format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_tools::{MarkdownDocument, document_tools};
    use std::sync::Arc;

    #[test]
    fn test_doc_prompt_lists_bound_tools_only() {
        let doc = Arc::new(MarkdownDocument::parse("# Title\n\nBody"));
        let tools = ToolRegistry::from_tools(document_tools(doc));
        let prompt = build_doc_agent_prompt(7, "what is it?", &tools);
        assert!(prompt.contains("Database ID 7"));
        assert!(prompt.contains("\"what is it?\""));
        assert!(prompt.contains("- get_table_by_line:"));
        assert!(!prompt.contains("- get_links:"));
        assert!(prompt.contains("Current date: "));
    }

    #[test]
    fn test_synthesis_request_layout() {
        let analyses = vec![
            ("https://a.example".to_string(), "A says yes".to_string()),
            ("https://b.example".to_string(), "B says no".to_string()),
        ];
        let request = synthesis_request("yes or no?", &analyses);
        assert!(request.starts_with("Original Query: yes or no?\n\n"));
        assert!(request.contains("from 2 different sources"));
        assert!(request.contains(
            "SOURCE: https://a.example\nANALYSIS:\nA says yes\n---\n\nSOURCE: https://b.example\nANALYSIS:\nB says no\n---"
        ));
    }

    #[test]
    fn test_doc_request_text() {
        assert_eq!(
            doc_agent_request(3, "release notes"),
            "Analyze the content in database ID 3 and extract information relevant to: release notes"
        );
    }
}
