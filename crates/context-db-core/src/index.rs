//! Vector search index over completed embeddings.
//!
//! Holds exactly one vector per search-visible resource. The embedding
//! pipeline inserts on success and removes on re-enqueue or terminal
//! failure, so membership here is what "discoverable by `find`" means.
//!
//! # Ranking
//!
//! 1. Restrict to resources under `scope` (inclusive), if given.
//! 2. Score each candidate by cosine similarity to the query vector.
//! 3. Sort by score (desc), then URI (asc) for deterministic ties.
//! 4. Truncate to `limit`.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::shard::ShardedMap;
use crate::uri::ResourceUri;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub uri: ResourceUri,
    pub score: f64,
}

#[derive(Default)]
pub struct SearchIndex {
    vectors: ShardedMap<Arc<[f32]>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a resource discoverable with the given vector, replacing any
    /// previous one.
    pub fn insert(&self, uri: ResourceUri, vector: Vec<f32>) {
        self.vectors.insert(uri, Arc::from(vector));
    }

    /// Hide a resource from search. Returns whether it was indexed.
    pub fn remove(&self, uri: &ResourceUri) -> bool {
        self.vectors.remove(uri).is_some()
    }

    pub fn contains(&self, uri: &ResourceUri) -> bool {
        self.vectors.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Rank indexed resources against `query`.
    pub fn query(&self, query: &[f32], limit: usize, scope: Option<&ResourceUri>) -> Vec<SearchHit> {
        if limit == 0 {
            return Vec::new();
        }

        let mut hits = Vec::new();
        self.vectors.for_each(|uri, vector| {
            if scope.map_or(true, |s| s.contains(uri)) {
                hits.push(SearchHit {
                    uri: uri.clone(),
                    score: cosine_similarity(query, vector) as f64,
                });
            }
        });

        hits.sort_by(rank_order);
        hits.truncate(limit);
        hits
    }
}

fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.uri.cmp(&b.uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> ResourceUri {
        ResourceUri::parse(s).unwrap()
    }

    fn sample() -> SearchIndex {
        let index = SearchIndex::new();
        index.insert(uri("ctx://resources/a.md"), vec![1.0, 0.0]);
        index.insert(uri("ctx://resources/b.md"), vec![0.0, 1.0]);
        index.insert(uri("ctx://resources/docs/c.md"), vec![0.7, 0.7]);
        index
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let hits = sample().query(&[1.0, 0.1], 10, None);
        let uris: Vec<&str> = hits.iter().map(|h| h.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec![
                "ctx://resources/a.md",
                "ctx://resources/docs/c.md",
                "ctx://resources/b.md"
            ]
        );
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_ties_break_by_uri() {
        let index = SearchIndex::new();
        index.insert(uri("ctx://resources/z.md"), vec![1.0, 0.0]);
        index.insert(uri("ctx://resources/m.md"), vec![2.0, 0.0]);
        index.insert(uri("ctx://resources/a.md"), vec![3.0, 0.0]);
        let hits = index.query(&[1.0, 0.0], 3, None);
        let uris: Vec<&str> = hits.iter().map(|h| h.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec!["ctx://resources/a.md", "ctx://resources/m.md", "ctx://resources/z.md"]
        );
    }

    #[test]
    fn test_limit_and_oversized_limit() {
        let index = sample();
        assert_eq!(index.query(&[1.0, 0.0], 1, None).len(), 1);
        assert_eq!(index.query(&[1.0, 0.0], 100, None).len(), 3);
        assert!(index.query(&[1.0, 0.0], 0, None).is_empty());
    }

    #[test]
    fn test_scope_restricts_to_subtree() {
        let index = sample();
        let hits = index.query(&[1.0, 0.0], 10, Some(&uri("ctx://resources/docs")));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uri.as_str(), "ctx://resources/docs/c.md");

        let exact = index.query(&[1.0, 0.0], 10, Some(&uri("ctx://resources/a.md")));
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_removed_resource_never_returned() {
        let index = sample();
        assert!(index.remove(&uri("ctx://resources/a.md")));
        assert!(!index.remove(&uri("ctx://resources/a.md")));
        let hits = index.query(&[1.0, 0.0], 10, None);
        assert!(hits.iter().all(|h| h.uri.as_str() != "ctx://resources/a.md"));
    }

    #[test]
    fn test_query_is_stable() {
        let index = sample();
        let first = index.query(&[0.3, 0.9], 10, None);
        let second = index.query(&[0.3, 0.9], 10, None);
        assert_eq!(first, second);
    }
}
