//! Contract shared by every fetch tier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use delve_core::error::Result;
use delve_core::types::FetchMethod;

/// What a tier returns for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    /// Extracted markdown-like text.
    pub text: String,
}

impl FetchResponse {
    /// Success means a 2xx status and non-blank text.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && !self.text.trim().is_empty()
    }
}

/// One fetch strategy.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    /// Which tier this backend implements.
    fn method(&self) -> FetchMethod;

    /// Fetch `url` and extract its text. Transport failures and timeouts are
    /// errors; unsuccessful statuses are returned as responses.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_needs_2xx_and_text() {
        let ok = |status: u16, text: &str| FetchResponse {
            status,
            text: text.into(),
        };
        assert!(ok(200, "# Title").is_success());
        assert!(ok(204, "body").is_success());
        assert!(!ok(200, "  \n\t ").is_success());
        assert!(!ok(403, "Forbidden").is_success());
        assert!(!ok(301, "Moved").is_success());
    }
}
