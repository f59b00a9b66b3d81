//! Summarization providers.
//!
//! Each provider turns raw resource text into one [`SummaryLevel`]:
//! a one-to-two sentence abstract (L0) or a structured overview (L1).
//! The answer is read from exactly one plain-text field of the response;
//! anything else (a missing field, a structured "reasoning" payload
//! instead of content) is a [`ContextError::Provider`].

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use context_db_core::models::SummaryLevel;
use context_db_core::summary::Summarizer;
use context_db_core::ContextError;

use crate::config::SummarizationConfig;
use crate::http;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Instruction for one summary level.
pub fn prompt_for(level: SummaryLevel) -> &'static str {
    match level {
        SummaryLevel::Abstract => {
            "Write a one or two sentence abstract of the following document. \
             State what it is and what it covers. Reply with the abstract only."
        }
        SummaryLevel::Overview => {
            "Write a structured overview of the following document in Markdown. \
             Cover its purpose, main sections, key facts, and anything a reader \
             would need to decide whether to open the full text. \
             Reply with the overview only."
        }
    }
}

pub fn create_summarizer(config: &SummarizationConfig) -> Result<Arc<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSummarizer)),
        "openai" => Ok(Arc::new(OpenAISummarizer::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaSummarizer::new(config)?)),
        other => bail!("Unknown summarization provider: {}", other),
    }
}

pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn summarize(&self, _text: &str, _level: SummaryLevel) -> Result<String> {
        Err(ContextError::Provider(
            "summarization provider is disabled; set [summarization] provider in config"
                .to_string(),
        )
        .into())
    }
}

/// OpenAI-compatible chat completions.
pub struct OpenAISummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAISummarizer {
    pub fn new(config: &SummarizationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarization.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAISummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, level: SummaryLevel) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt_for(level)},
                {"role": "user", "content": text},
            ],
        });
        let json = http::post_json(
            &self.client,
            &http::endpoint(&self.url, "chat/completions"),
            Some(&self.api_key),
            &body,
        )
        .await?;
        parse_chat_response(&json)
    }
}

/// `choices[0].message.content`, which must be a string.
fn parse_chat_response(json: &Value) -> Result<String> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            ContextError::Provider("chat response missing choices[0].message".to_string())
        })?;
    match message.get("content") {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(ContextError::Provider(
            "chat response has no plain-text message content".to_string(),
        )
        .into()),
    }
}

/// Ollama `/api/generate` without streaming.
pub struct OllamaSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarization.model required for Ollama provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model,
        })
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, level: SummaryLevel) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": prompt_for(level),
            "prompt": text,
            "stream": false,
        });
        let json = http::post_json(
            &self.client,
            &http::endpoint(&self.url, "api/generate"),
            None,
            &body,
        )
        .await?;
        match json.get("response") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(ContextError::Provider(
                "Ollama response missing plain-text 'response'".to_string(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat_content() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "A memo."}}]});
        assert_eq!(parse_chat_response(&json).unwrap(), "A memo.");
    }

    #[test]
    fn test_reasoning_only_response_is_rejected() {
        let json = json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "reasoning_content": "Let me think about this memo..."
        }}]});
        let err = parse_chat_response(&json).unwrap_err();
        assert!(matches!(
            ContextError::find(&err),
            Some(ContextError::Provider(_))
        ));
    }

    #[test]
    fn test_prompts_differ_per_level() {
        assert_ne!(
            prompt_for(SummaryLevel::Abstract),
            prompt_for(SummaryLevel::Overview)
        );
    }

    #[tokio::test]
    async fn test_disabled_summarizer_fails() {
        assert!(DisabledSummarizer
            .summarize("text", SummaryLevel::Abstract)
            .await
            .is_err());
    }
}
