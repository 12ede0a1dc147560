use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelveError {
    /// The model endpoint could not be reached or refused the request.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A streamed delta carried neither text nor tool-call data.
    #[error("Malformed delta: {0}")]
    MalformedDelta(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    ToolArgument { tool: String, reason: String },

    #[error("Error executing tool '{tool}': {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Fetch tier '{tier}' failed for {url}: {reason}")]
    FetchTier {
        tier: String,
        url: String,
        reason: String,
    },

    #[error("All fetch tiers failed for {0}")]
    AllTiersFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DelveError {
    /// Errors that end the enclosing step and agent run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DelveError::Connection(_) | DelveError::MalformedDelta(_) | DelveError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, DelveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_messages() {
        let err = DelveError::ToolNotFound("get_overview".into());
        assert_eq!(err.to_string(), "Tool 'get_overview' not found");

        let err = DelveError::ToolArgument {
            tool: "get_table_by_line".into(),
            reason: "expected value at line 1 column 1".into(),
        };
        assert!(err.to_string().starts_with("Invalid arguments for tool 'get_table_by_line'"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DelveError::Connection("refused".into()).is_fatal());
        assert!(DelveError::MalformedDelta("empty".into()).is_fatal());
        assert!(DelveError::Cancelled.is_fatal());
        assert!(!DelveError::ToolNotFound("x".into()).is_fatal());
        assert!(!DelveError::AllTiersFailed("https://a".into()).is_fatal());
    }
}
