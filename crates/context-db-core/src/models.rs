//! Core data models shared by the store, the pipelines, and the façade.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::uri::ResourceUri;

/// Where a resource came from.
///
/// Two resources are the "same origin" exactly when their `Origin` values are
/// equal; the app layer canonicalizes paths before building one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "locator", rename_all = "lowercase")]
pub enum Origin {
    File(String),
    Url(String),
    /// Never stored; the resolver rejects it.
    Directory(String),
}

impl Origin {
    pub fn kind(&self) -> &'static str {
        match self {
            Origin::File(_) => "file",
            Origin::Url(_) => "url",
            Origin::Directory(_) => "directory",
        }
    }

    pub fn locator(&self) -> &str {
        match self {
            Origin::File(s) | Origin::Url(s) | Origin::Directory(s) => s,
        }
    }

    /// Rebuild an origin from its persisted `(kind, locator)` pair.
    pub fn from_parts(kind: &str, locator: &str) -> Option<Self> {
        match kind {
            "file" => Some(Origin::File(locator.to_string())),
            "url" => Some(Origin::Url(locator.to_string())),
            "directory" => Some(Origin::Directory(locator.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.locator())
    }
}

/// The two background pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Embed,
    Summarize,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Embed => "embed",
            PipelineKind::Summarize => "summarize",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pipeline processing state of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Done => "done",
            PipelineStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Done | PipelineStatus::Failed)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(PipelineStatus::Pending),
            "running" => Ok(PipelineStatus::Running),
            "done" => Ok(PipelineStatus::Done),
            "failed" => Ok(PipelineStatus::Failed),
            other => anyhow::bail!("unknown pipeline status: {}", other),
        }
    }
}

/// Generated summary levels. L2 (raw content) is not generated and lives on
/// the resource itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    /// L0: a sentence or two.
    Abstract,
    /// L1: a structured, detailed summary.
    Overview,
}

impl SummaryLevel {
    pub const ALL: [SummaryLevel; 2] = [SummaryLevel::Abstract, SummaryLevel::Overview];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Abstract => "abstract",
            SummaryLevel::Overview => "overview",
        }
    }
}

impl fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "abstract" => Ok(SummaryLevel::Abstract),
            "overview" => Ok(SummaryLevel::Overview),
            other => anyhow::bail!("unknown summary level: {}", other),
        }
    }
}

/// A stored resource: identity, origin, and both pipeline states.
///
/// Raw content (L2) is fetched separately via
/// [`ResourceStore::content`](crate::store::ResourceStore::content) so that
/// status reads stay cheap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub uri: ResourceUri,
    pub origin: Origin,
    pub content_type: String,
    /// SHA-256 of the raw content, hex encoded.
    pub content_hash: String,
    /// Raw content size in bytes.
    pub size: u64,
    pub embed_status: PipelineStatus,
    pub embed_error: Option<String>,
    pub summary_status: PipelineStatus,
    pub summary_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Resource {
    /// Parent URI, derived from the path rather than stored.
    pub fn parent(&self) -> Option<ResourceUri> {
        self.uri.parent()
    }

    pub fn status(&self, kind: PipelineKind) -> PipelineStatus {
        match kind {
            PipelineKind::Embed => self.embed_status,
            PipelineKind::Summarize => self.summary_status,
        }
    }

    pub fn error(&self, kind: PipelineKind) -> Option<&str> {
        match kind {
            PipelineKind::Embed => self.embed_error.as_deref(),
            PipelineKind::Summarize => self.summary_error.as_deref(),
        }
    }
}

/// A dense vector for one resource, immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub dims: usize,
    /// Hash of the content the vector was computed from.
    pub content_hash: String,
}

/// One row of `ls` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub uri: ResourceUri,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub size: u64,
}

/// Outcome class of an add call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddStatus {
    Success,
    Failed,
    Collision,
}

/// Result of `add_resource`, matching the `{status, uri?, error?}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddResult {
    pub status: AddStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<ResourceUri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AddResult {
    pub fn success(uri: ResourceUri) -> Self {
        Self {
            status: AddStatus::Success,
            uri: Some(uri),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AddStatus::Success
    }
}
