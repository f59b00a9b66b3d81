//! Summarization pipeline: raw content → abstract (L0) and overview (L1).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use context_db_core::models::{PipelineKind, SummaryLevel};
use context_db_core::store::ResourceStore;
use context_db_core::summary::{accept_summary, Summarizer};
use context_db_core::{ContextError, ResourceUri};

use super::{truncate_chars, Processor};

pub struct SummarizeProcessor {
    store: Arc<dyn ResourceStore>,
    summarizer: Arc<dyn Summarizer>,
    max_input_chars: usize,
}

impl SummarizeProcessor {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        summarizer: Arc<dyn Summarizer>,
        max_input_chars: usize,
    ) -> Self {
        Self {
            store,
            summarizer,
            max_input_chars,
        }
    }
}

#[async_trait]
impl Processor for SummarizeProcessor {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Summarize
    }

    async fn process(&self, uri: &ResourceUri) -> Result<()> {
        let content = self
            .store
            .content(uri)
            .await?
            .ok_or_else(|| ContextError::NotFound(uri.to_string()))?;
        let text = truncate_chars(&content, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(ContextError::PipelineFailure {
                pipeline: PipelineKind::Summarize,
                uri: uri.to_string(),
                message: "resource has no text to summarize".to_string(),
            }
            .into());
        }

        for level in SummaryLevel::ALL {
            let raw = self.summarizer.summarize(text, level).await?;
            let summary = accept_summary(level, raw)?;
            self.store.put_summary(uri, level, &summary).await?;
            debug!(uri = %uri, level = %level, chars = summary.len(), "summary stored");
        }
        Ok(())
    }

    async fn on_failure(&self, uri: &ResourceUri, err: &anyhow::Error) {
        warn!(uri = %uri, error = %format!("{:#}", err), "summarization failed; raw content is still readable");
    }
}
