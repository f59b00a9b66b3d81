//! Embedding pipeline: raw content → one vector per resource → index.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::error;

use context_db_core::embedding::Embedder;
use context_db_core::index::SearchIndex;
use context_db_core::models::{Embedding, PipelineKind};
use context_db_core::store::ResourceStore;
use context_db_core::{ContextError, ResourceUri};

use super::{truncate_chars, Processor};
use crate::origin::hash_text;

pub struct EmbedProcessor {
    store: Arc<dyn ResourceStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<SearchIndex>,
    max_input_chars: usize,
}

impl EmbedProcessor {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<SearchIndex>,
        max_input_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            max_input_chars,
        }
    }

    fn failure(&self, uri: &ResourceUri, message: String) -> anyhow::Error {
        ContextError::PipelineFailure {
            pipeline: PipelineKind::Embed,
            uri: uri.to_string(),
            message,
        }
        .into()
    }
}

#[async_trait]
impl Processor for EmbedProcessor {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Embed
    }

    /// A resource being re-embedded must not be searchable with its old vector.
    async fn on_enqueue(&self, uri: &ResourceUri) {
        self.index.remove(uri);
    }

    async fn process(&self, uri: &ResourceUri) -> Result<()> {
        let content = self
            .store
            .content(uri)
            .await?
            .ok_or_else(|| ContextError::NotFound(uri.to_string()))?;
        let text = truncate_chars(&content, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(self.failure(uri, "resource has no text to embed".to_string()));
        }

        let vector = self.embedder.embed(text).await?;
        let dims = self.embedder.dims();
        if vector.len() != dims {
            return Err(self.failure(
                uri,
                format!("expected {} dimensions, provider returned {}", dims, vector.len()),
            ));
        }

        let embedding = Embedding {
            vector: vector.clone(),
            model: self.embedder.model_name().to_string(),
            dims,
            content_hash: hash_text(&content),
        };
        self.store.put_embedding(uri, &embedding).await?;
        self.index.insert(uri.clone(), vector);
        Ok(())
    }

    async fn on_failure(&self, uri: &ResourceUri, err: &anyhow::Error) {
        self.index.remove(uri);
        error!(uri = %uri, error = %format!("{:#}", err), "embedding failed; resource is not searchable");
    }
}
