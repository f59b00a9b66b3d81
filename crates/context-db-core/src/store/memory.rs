//! In-memory [`ResourceStore`] for tests and embedded use.
//!
//! Entries live in a [`ShardedMap`], so every per-resource write takes only
//! its shard's lock. Nothing is persisted.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ContextError;
use crate::models::{Embedding, ListEntry, PipelineKind, PipelineStatus, Resource, SummaryLevel};
use crate::shard::ShardedMap;
use crate::uri::ResourceUri;

use super::{list_children, ResourceStore};

struct StoredResource {
    resource: Resource,
    content: String,
    summaries: HashMap<SummaryLevel, String>,
    embedding: Option<Embedding>,
}

pub struct InMemoryStore {
    entries: ShardedMap<StoredResource>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: ShardedMap::default(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(uri: &ResourceUri) -> anyhow::Error {
    ContextError::NotFound(uri.to_string()).into()
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn put(&self, resource: &Resource, content: &str) -> Result<()> {
        self.entries.upsert(
            resource.uri.clone(),
            || StoredResource {
                resource: resource.clone(),
                content: content.to_string(),
                summaries: HashMap::new(),
                embedding: None,
            },
            |existing| {
                let created_at = existing.resource.created_at;
                existing.resource = resource.clone();
                existing.resource.created_at = created_at;
                existing.content = content.to_string();
            },
        );
        Ok(())
    }

    async fn get(&self, uri: &ResourceUri) -> Result<Option<Resource>> {
        Ok(self.entries.with(uri, |e| e.resource.clone()))
    }

    async fn content(&self, uri: &ResourceUri) -> Result<Option<String>> {
        Ok(self.entries.with(uri, |e| e.content.clone()))
    }

    async fn resources(&self) -> Result<Vec<Resource>> {
        let mut out = Vec::new();
        self.entries.for_each(|_, e| out.push(e.resource.clone()));
        out.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(out)
    }

    async fn list(&self, prefix: &ResourceUri) -> Result<Vec<ListEntry>> {
        let mut stored = Vec::new();
        self.entries
            .for_each(|uri, e| stored.push((uri.clone(), e.resource.size)));
        Ok(list_children(prefix, stored.iter().map(|(u, s)| (u, *s))))
    }

    async fn set_status(
        &self,
        uri: &ResourceUri,
        kind: PipelineKind,
        status: PipelineStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.entries
            .with_mut(uri, |e| {
                let error = error.map(str::to_string);
                match kind {
                    PipelineKind::Embed => {
                        e.resource.embed_status = status;
                        e.resource.embed_error = error;
                    }
                    PipelineKind::Summarize => {
                        e.resource.summary_status = status;
                        e.resource.summary_error = error;
                    }
                }
                e.resource.updated_at = now;
            })
            .ok_or_else(|| missing(uri))
    }

    async fn put_summary(&self, uri: &ResourceUri, level: SummaryLevel, text: &str) -> Result<()> {
        self.entries
            .with_mut(uri, |e| {
                e.summaries.insert(level, text.to_string());
            })
            .ok_or_else(|| missing(uri))
    }

    async fn get_summary(&self, uri: &ResourceUri, level: SummaryLevel) -> Result<Option<String>> {
        Ok(self
            .entries
            .with(uri, |e| e.summaries.get(&level).cloned())
            .flatten())
    }

    async fn put_embedding(&self, uri: &ResourceUri, embedding: &Embedding) -> Result<()> {
        self.entries
            .with_mut(uri, |e| e.embedding = Some(embedding.clone()))
            .ok_or_else(|| missing(uri))
    }

    async fn embeddings(&self) -> Result<Vec<(ResourceUri, Embedding)>> {
        let mut out = Vec::new();
        self.entries.for_each(|uri, e| {
            if let Some(emb) = &e.embedding {
                out.push((uri.clone(), emb.clone()));
            }
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Origin;

    fn resource(uri: &str, created_at: i64) -> Resource {
        Resource {
            uri: ResourceUri::parse(uri).unwrap(),
            origin: Origin::File(format!("/src/{}", uri.rsplit('/').next().unwrap())),
            content_type: "text/plain".to_string(),
            content_hash: "h".to_string(),
            size: 4,
            embed_status: PipelineStatus::Pending,
            embed_error: None,
            summary_status: PipelineStatus::Pending,
            summary_error: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_put_keeps_created_at() {
        let store = InMemoryStore::new();
        let r = resource("ctx://resources/a.md", 100);
        store.put(&r, "one").await.unwrap();
        let mut r2 = resource("ctx://resources/a.md", 200);
        r2.size = 3;
        store.put(&r2, "two").await.unwrap();

        let got = store.get(&r.uri).await.unwrap().unwrap();
        assert_eq!(got.created_at, 100);
        assert_eq!(got.size, 3);
        assert_eq!(store.content(&r.uri).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_status_fields_are_independent() {
        let store = InMemoryStore::new();
        let r = resource("ctx://resources/a.md", 1);
        store.put(&r, "x").await.unwrap();

        store
            .set_status(&r.uri, PipelineKind::Embed, PipelineStatus::Done, None)
            .await
            .unwrap();
        store
            .set_status(&r.uri, PipelineKind::Summarize, PipelineStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let got = store.require(&r.uri).await.unwrap();
        assert_eq!(got.embed_status, PipelineStatus::Done);
        assert_eq!(got.embed_error, None);
        assert_eq!(got.summary_status, PipelineStatus::Failed);
        assert_eq!(got.summary_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_require_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .require(&ResourceUri::parse("ctx://resources/nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContextError>(),
            Some(ContextError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_status_on_missing_fails() {
        let store = InMemoryStore::new();
        let uri = ResourceUri::parse("ctx://resources/ghost").unwrap();
        assert!(store
            .set_status(&uri, PipelineKind::Embed, PipelineStatus::Running, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_summaries_and_embeddings() {
        let store = InMemoryStore::new();
        let r = resource("ctx://resources/a.md", 1);
        store.put(&r, "x").await.unwrap();
        assert!(store
            .get_summary(&r.uri, SummaryLevel::Abstract)
            .await
            .unwrap()
            .is_none());

        store
            .put_summary(&r.uri, SummaryLevel::Abstract, "short")
            .await
            .unwrap();
        store
            .put_embedding(
                &r.uri,
                &Embedding {
                    vector: vec![1.0, 0.0],
                    model: "m".into(),
                    dims: 2,
                    content_hash: "h".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store
                .get_summary(&r.uri, SummaryLevel::Abstract)
                .await
                .unwrap()
                .as_deref(),
            Some("short")
        );
        assert!(store
            .get_summary(&r.uri, SummaryLevel::Overview)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.embeddings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_through_store() {
        let store = InMemoryStore::new();
        for u in ["ctx://resources/b.md", "ctx://resources/d/x.md", "ctx://resources/a.md"] {
            store.put(&resource(u, 1), "abcd").await.unwrap();
        }
        let entries = store.list(&ResourceUri::root("ctx")).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md", "d"]);
        assert!(entries[2].is_dir);
        assert_eq!(entries[0].size, 4);
    }
}
