//! Namespace resolver: external identity → canonical resource URI.
//!
//! A URI is `<root>/<parent segments>/<leaf>`, where the leaf is the
//! sanitized file base name (or last URL path segment) and the parent
//! segments come from the caller. Binding is checked against the store:
//!
//! | Stored at URI | Result |
//! |---------------|--------|
//! | nothing | fresh [`Minted`] |
//! | same origin | [`Minted`] with `existing = true` (refresh) |
//! | other origin | [`ContextError::Collision`] |
//!
//! Directory origins are rejected; expanding them is the caller's job.

use anyhow::Result;

use crate::error::ContextError;
use crate::models::Origin;
use crate::store::ResourceStore;
use crate::uri::{sanitize_segment, ResourceUri};

/// A URI claimed for an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub uri: ResourceUri,
    /// The URI was already bound to this same origin.
    pub existing: bool,
}

pub struct NamespaceResolver {
    root: ResourceUri,
}

impl NamespaceResolver {
    pub fn new(scheme: &str) -> Self {
        Self {
            root: ResourceUri::root(scheme),
        }
    }

    pub fn root(&self) -> &ResourceUri {
        &self.root
    }

    /// Compute the URI for `origin` without consulting the store.
    pub fn compose(&self, origin: &Origin, parent: Option<&str>) -> Result<ResourceUri, ContextError> {
        let leaf = match origin {
            Origin::Directory(path) => {
                return Err(ContextError::UnsupportedOrigin(format!(
                    "{} is a directory; add its files individually",
                    path
                )))
            }
            Origin::File(path) => file_leaf(path),
            Origin::Url(url) => url_leaf(url),
        };
        let leaf = sanitize_segment(&leaf).ok_or_else(|| {
            ContextError::UnsupportedOrigin(format!("cannot derive a name from {}", origin))
        })?;

        let base = match parent {
            Some(p) => self.resolve_parent(p)?,
            None => self.root.clone(),
        };
        Ok(base.join(&leaf))
    }

    /// Compute the URI for `origin` and check it against the store.
    pub async fn mint<S>(&self, store: &S, origin: &Origin, parent: Option<&str>) -> Result<Minted>
    where
        S: ResourceStore + ?Sized,
    {
        let uri = self.compose(origin, parent)?;
        match store.get(&uri).await? {
            None => Ok(Minted {
                uri,
                existing: false,
            }),
            Some(existing) if existing.origin == *origin => Ok(Minted {
                uri,
                existing: true,
            }),
            Some(existing) => Err(ContextError::Collision {
                uri: uri.to_string(),
                existing: existing.origin.to_string(),
            }
            .into()),
        }
    }

    /// Accept either a full URI under the root or a relative `a/b` path.
    fn resolve_parent(&self, parent: &str) -> Result<ResourceUri, ContextError> {
        if parent.contains("://") {
            let uri = ResourceUri::parse(parent)?;
            if !self.root.contains(&uri) {
                return Err(ContextError::InvalidUri(format!(
                    "{} is outside {}",
                    parent, self.root
                )));
            }
            return Ok(uri);
        }

        let mut uri = self.root.clone();
        for raw in parent.split(['/', '\\']).filter(|s| !s.trim().is_empty()) {
            let seg = sanitize_segment(raw)
                .ok_or_else(|| ContextError::InvalidUri(format!("bad path segment: {:?}", raw)))?;
            uri = uri.join(&seg);
        }
        Ok(uri)
    }
}

fn file_leaf(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Last non-empty path segment of a URL, falling back to the host.
fn url_leaf(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let without_tail = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let mut parts = without_tail.split('/');
    let host = parts.next().unwrap_or_default();
    parts
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or(host)
        .to_string()
}
