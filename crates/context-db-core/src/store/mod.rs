//! Storage abstraction for Context DB.
//!
//! The [`ResourceStore`] trait is the flat, URI-keyed persistence layer that
//! the resolver, both pipelines, and the façade share. It holds resource
//! metadata and raw content (L2), generated summaries (L0/L1), and
//! embeddings. Hierarchy is never stored: [`list_children`] derives it from
//! URI prefixes.
//!
//! Implementations must be `Send + Sync` and keep each pipeline's status
//! fields independent, so a summarization update can never clobber an
//! embedding update for the same resource.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ContextError;
use crate::models::{Embedding, ListEntry, PipelineKind, PipelineStatus, Resource, SummaryLevel};
use crate::uri::ResourceUri;

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](ResourceStore::put) | Insert or replace a resource and its raw content |
/// | [`get`](ResourceStore::get) | Fetch resource metadata |
/// | [`content`](ResourceStore::content) | Fetch raw content (L2) |
/// | [`list`](ResourceStore::list) | Children of a URI |
/// | [`set_status`](ResourceStore::set_status) | Update one pipeline's status |
/// | [`put_summary`](ResourceStore::put_summary) | Replace one summary level |
/// | [`put_embedding`](ResourceStore::put_embedding) | Store a resource vector |
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert or replace a resource and its raw content.
    ///
    /// On replace, `created_at` of the existing row is kept.
    async fn put(&self, resource: &Resource, content: &str) -> Result<()>;

    async fn get(&self, uri: &ResourceUri) -> Result<Option<Resource>>;

    /// Raw content (L2) of a resource.
    async fn content(&self, uri: &ResourceUri) -> Result<Option<String>>;

    /// Every stored resource, ordered by URI.
    async fn resources(&self) -> Result<Vec<Resource>>;

    /// Direct children of `prefix`, ordered by name.
    async fn list(&self, prefix: &ResourceUri) -> Result<Vec<ListEntry>>;

    /// Update one pipeline's status; the other pipeline's fields are untouched.
    async fn set_status(
        &self,
        uri: &ResourceUri,
        kind: PipelineKind,
        status: PipelineStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Replace one summary level as a single write.
    async fn put_summary(&self, uri: &ResourceUri, level: SummaryLevel, text: &str) -> Result<()>;

    async fn get_summary(&self, uri: &ResourceUri, level: SummaryLevel) -> Result<Option<String>>;

    async fn put_embedding(&self, uri: &ResourceUri, embedding: &Embedding) -> Result<()>;

    /// All stored embeddings, used to warm the search index at startup.
    async fn embeddings(&self) -> Result<Vec<(ResourceUri, Embedding)>>;

    /// Like [`get`](ResourceStore::get), but absence is a
    /// [`ContextError::NotFound`].
    async fn require(&self, uri: &ResourceUri) -> Result<Resource> {
        self.get(uri)
            .await?
            .ok_or_else(|| ContextError::NotFound(uri.to_string()).into())
    }
}

/// Derive the direct children of `prefix` from a flat set of stored URIs.
///
/// Each stored URI strictly below `prefix` contributes the segment directly
/// under it. An entry is a directory exactly when some stored URI has the
/// entry's URI as a strict prefix; its size is the stored resource size when
/// the entry itself is a resource, else 0. Output is sorted by name.
pub fn list_children<'a, I>(prefix: &ResourceUri, stored: I) -> Vec<ListEntry>
where
    I: IntoIterator<Item = (&'a ResourceUri, u64)>,
{
    let mut entries: BTreeMap<String, ListEntry> = BTreeMap::new();

    for (uri, size) in stored {
        let Some(name) = prefix.child_toward(uri) else {
            continue;
        };
        let child_uri = prefix.join(name);
        let is_self = child_uri == *uri;
        let entry = entries.entry(name.to_string()).or_insert_with(|| ListEntry {
            name: name.to_string(),
            uri: child_uri,
            is_dir: false,
            size: 0,
        });
        if is_self {
            entry.size = size;
        } else {
            entry.is_dir = true;
        }
    }

    entries.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> ResourceUri {
        ResourceUri::parse(s).unwrap()
    }

    #[test]
    fn test_list_children_orders_and_flags_dirs() {
        let stored = vec![
            (uri("ctx://resources/zeta.md"), 10),
            (uri("ctx://resources/docs/b.md"), 3),
            (uri("ctx://resources/alpha.md"), 7),
            (uri("ctx://resources/docs/a/deep.md"), 1),
        ];
        let entries = list_children(
            &ResourceUri::root("ctx"),
            stored.iter().map(|(u, s)| (u, *s)),
        );
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.md", "docs", "zeta.md"]);
        assert!(entries[1].is_dir);
        assert_eq!(entries[1].size, 0);
        assert_eq!(entries[1].uri.as_str(), "ctx://resources/docs");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[0].size, 7);
    }

    #[test]
    fn test_list_children_nested_scope() {
        let stored = vec![
            (uri("ctx://resources/docs/b.md"), 3),
            (uri("ctx://resources/docs/a/deep.md"), 1),
            (uri("ctx://resources/docsx/c.md"), 1),
        ];
        let entries = list_children(
            &uri("ctx://resources/docs"),
            stored.iter().map(|(u, s)| (u, *s)),
        );
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b.md"]);
        assert!(entries[0].is_dir);
        assert!(!entries[1].is_dir);
    }

    #[test]
    fn test_entry_can_be_resource_and_directory() {
        let stored = vec![
            (uri("ctx://resources/notes"), 5),
            (uri("ctx://resources/notes/inner.md"), 2),
        ];
        let entries = list_children(
            &ResourceUri::root("ctx"),
            stored.iter().map(|(u, s)| (u, *s)),
        );
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].size, 5);
    }

    #[test]
    fn test_list_children_of_leaf_is_empty() {
        let stored = vec![(uri("ctx://resources/a.md"), 1)];
        let entries = list_children(&uri("ctx://resources/a.md"), stored.iter().map(|(u, s)| (u, *s)));
        assert!(entries.is_empty());
    }
}
