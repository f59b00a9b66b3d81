//! TOML configuration parsing and validation.
//!
//! `config/ctxdb.example.toml` lists every key with its default.
//! Provider credentials are read from the environment, never from here.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use context_db_core::uri::is_valid_scheme;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NamespaceConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
        }
    }
}

fn default_scheme() -> String {
    "ctx".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for OpenAI-compatible or Ollama endpoints.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_embed_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embed_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embed_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
            concurrency: default_embed_concurrency(),
            max_input_chars: default_embed_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_summary_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_summary_input_chars")]
    pub max_input_chars: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            timeout_secs: default_summary_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
            concurrency: default_summary_concurrency(),
            max_input_chars: default_summary_input_chars(),
        }
    }
}

impl SummarizationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_summary_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_embed_concurrency() -> usize {
    4
}
fn default_summary_concurrency() -> usize {
    2
}
fn default_embed_input_chars() -> usize {
    8000
}
fn default_summary_input_chars() -> usize {
    16000
}
fn default_limit() -> usize {
    5
}

/// Per-pipeline worker and retry settings, shared by both pipelines.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Total attempts per work item, first try included.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base * 2^(n-1)`, capped at `2^5`.
    pub retry_backoff: Duration,
    pub concurrency: usize,
    pub max_input_chars: usize,
}

impl PipelineOptions {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.retry_backoff * (1u32 << (attempt - 1).min(5))
    }
}

impl From<&EmbeddingConfig> for PipelineOptions {
    fn from(c: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: c.max_retries + 1,
            retry_backoff: Duration::from_millis(c.retry_backoff_ms),
            concurrency: c.concurrency,
            max_input_chars: c.max_input_chars,
        }
    }
}

impl From<&SummarizationConfig> for PipelineOptions {
    fn from(c: &SummarizationConfig) -> Self {
        Self {
            max_attempts: c.max_retries + 1,
            retry_backoff: Duration::from_millis(c.retry_backoff_ms),
            concurrency: c.concurrency,
            max_input_chars: c.max_input_chars,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !is_valid_scheme(&config.namespace.scheme) {
        bail!(
            "namespace.scheme must be lowercase alphanumeric, got '{}'",
            config.namespace.scheme
        );
    }

    if config.retrieval.default_limit < 1 {
        bail!("retrieval.default_limit must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && config.embedding.provider != "local" {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.concurrency == 0 {
        bail!("embedding.concurrency must be >= 1");
    }

    match config.summarization.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown summarization provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.summarization.is_enabled() && config.summarization.model.is_none() {
        bail!(
            "summarization.model must be specified when provider is '{}'",
            config.summarization.provider
        );
    }
    if config.summarization.concurrency == 0 {
        bail!("summarization.concurrency must be >= 1");
    }

    Ok(())
}
