//! Summarization capability trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ContextError;
use crate::models::SummaryLevel;

/// The summarization capability: text plus a target level in, plain text out.
///
/// Implementations must read the answer from a single plain-text field of
/// the provider response. Providers that answer through structured or
/// alternate fields are reported as errors, never sniffed.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn summarize(&self, text: &str, level: SummaryLevel) -> Result<String>;
}

/// Validate a summary before it is stored: it must contain visible text.
pub fn accept_summary(level: SummaryLevel, raw: String) -> Result<String, ContextError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ContextError::Provider(format!(
            "empty {} returned by summarizer",
            level
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_trims() {
        let s = accept_summary(SummaryLevel::Abstract, "  short.\n".to_string()).unwrap();
        assert_eq!(s, "short.");
    }

    #[test]
    fn test_accept_rejects_blank() {
        let err = accept_summary(SummaryLevel::Overview, " \n\t".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "provider error: empty overview returned by summarizer");
    }
}
