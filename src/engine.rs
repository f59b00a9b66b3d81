//! The `ContextDb` façade: ingestion, completion barrier, search, browse.
//!
//! Wires the namespace resolver, a [`ResourceStore`], the search index, and
//! both pipelines together. Everything the CLI does goes through here.
//!
//! ```text
//! add_resource ─▶ classify ─▶ load ─▶ mint ─▶ store.put ─┬─▶ embed pipeline ─────▶ index
//!                                                        └─▶ summarize pipeline ─▶ L0/L1
//! find ─▶ embedder.embed(query) ─▶ index.query
//! ls / read / abstract / overview ─▶ store
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use context_db_core::embedding::Embedder;
use context_db_core::index::{SearchHit, SearchIndex};
use context_db_core::models::{
    AddResult, AddStatus, ListEntry, PipelineKind, PipelineStatus, Resource, SummaryLevel,
};
use context_db_core::namespace::NamespaceResolver;
use context_db_core::store::ResourceStore;
use context_db_core::summary::Summarizer;
use context_db_core::{ContextError, ResourceUri};

use crate::config::{Config, PipelineOptions};
use crate::embedding::create_embedder;
use crate::locks::KeyedLocks;
use crate::origin;
use crate::pipeline::embed::EmbedProcessor;
use crate::pipeline::summarize::SummarizeProcessor;
use crate::pipeline::Pipeline;
use crate::sqlite_store::SqliteStore;
use crate::summarize::create_summarizer;
use crate::tracker::{CompletionTracker, JoinScope, JoinSummary, WorkItem, WorkState};
use crate::{db, migrate};

/// Engine settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub scheme: String,
    pub embedding: PipelineOptions,
    pub summarization: PipelineOptions,
    /// Timeout for fetching URL origins.
    pub fetch_timeout: Duration,
    pub default_limit: usize,
    /// Re-enqueue unfinished work found in the store at open.
    pub resume_pending: bool,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scheme: config.namespace.scheme.clone(),
            embedding: PipelineOptions::from(&config.embedding),
            summarization: PipelineOptions::from(&config.summarization),
            fetch_timeout: Duration::from_secs(config.embedding.timeout_secs),
            default_limit: config.retrieval.default_limit,
            resume_pending: true,
        }
    }
}

/// Per-pipeline status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn record(&mut self, status: PipelineStatus) {
        match status {
            PipelineStatus::Pending => self.pending += 1,
            PipelineStatus::Running => self.running += 1,
            PipelineStatus::Done => self.done += 1,
            PipelineStatus::Failed => self.failed += 1,
        }
    }
}

/// Database-wide statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub resources: usize,
    pub embedding: StatusCounts,
    pub summarization: StatusCounts,
    pub indexed: usize,
    /// Work items of this process not yet terminal.
    pub outstanding: usize,
    /// Of `outstanding`, items still waiting for a worker.
    pub queued: usize,
    /// Of `outstanding`, items a worker is processing.
    pub active: usize,
    pub embedding_model: String,
    pub summarization_model: String,
}

pub struct ContextDb {
    resolver: NamespaceResolver,
    store: Arc<dyn ResourceStore>,
    index: Arc<SearchIndex>,
    tracker: Arc<CompletionTracker>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    embed: Pipeline,
    summarize: Pipeline,
    add_locks: KeyedLocks,
    fetch_timeout: Duration,
    default_limit: usize,
}

impl ContextDb {
    /// Open the SQLite-backed database described by `config`, creating
    /// the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_with(config, EngineOptions::from_config(config)).await
    }

    pub async fn open_with(config: &Config, options: EngineOptions) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let summarizer = create_summarizer(&config.summarization)?;
        Self::new(options, store, embedder, summarizer).await
    }

    /// Build an engine over any store and providers. Must be called inside
    /// a tokio runtime.
    ///
    /// Stored embeddings of `done` resources whose dimension matches the
    /// embedder are loaded into the index. With `resume_pending`, resources
    /// left `pending`/`running` by an earlier process, and `done` resources
    /// whose embedding could not be loaded, are re-enqueued.
    pub async fn new(
        options: EngineOptions,
        store: Arc<dyn ResourceStore>,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self> {
        let index = Arc::new(SearchIndex::new());
        let tracker = Arc::new(CompletionTracker::new());

        let embed = Pipeline::start(
            Arc::new(EmbedProcessor::new(
                store.clone(),
                embedder.clone(),
                index.clone(),
                options.embedding.max_input_chars,
            )),
            store.clone(),
            tracker.clone(),
            options.embedding.clone(),
        );
        let summarize = Pipeline::start(
            Arc::new(SummarizeProcessor::new(
                store.clone(),
                summarizer.clone(),
                options.summarization.max_input_chars,
            )),
            store.clone(),
            tracker.clone(),
            options.summarization.clone(),
        );

        let db = Self {
            resolver: NamespaceResolver::new(&options.scheme),
            store,
            index,
            tracker,
            embedder,
            summarizer,
            embed,
            summarize,
            add_locks: KeyedLocks::new(),
            fetch_timeout: options.fetch_timeout,
            default_limit: options.default_limit,
        };
        db.recover(options.resume_pending).await?;
        Ok(db)
    }

    async fn recover(&self, resume_pending: bool) -> Result<()> {
        let resources = self.store.resources().await?;
        let done: HashSet<&ResourceUri> = resources
            .iter()
            .filter(|r| r.embed_status == PipelineStatus::Done)
            .map(|r| &r.uri)
            .collect();

        let dims = self.embedder.dims();
        let mut mismatched = 0;
        for (uri, embedding) in self.store.embeddings().await? {
            if !done.contains(&uri) {
                continue;
            }
            if embedding.dims != dims || embedding.vector.len() != dims {
                mismatched += 1;
                continue;
            }
            self.index.insert(uri, embedding.vector);
        }
        if mismatched > 0 {
            warn!(
                mismatched,
                configured_dims = dims,
                "stored embeddings do not match the configured dimension"
            );
        }
        info!(indexed = self.index.len(), resources = resources.len(), "search index loaded");

        if !resume_pending {
            return Ok(());
        }
        let mut resumed = 0;
        for resource in &resources {
            // A disabled embedder reports zero dimensions; keep old vectors on disk.
            let stale_embedding = dims > 0
                && resource.embed_status == PipelineStatus::Done
                && !self.index.contains(&resource.uri);
            if !resource.embed_status.is_terminal() || stale_embedding {
                self.embed.enqueue(&resource.uri).await?;
                resumed += 1;
            }
            if !resource.summary_status.is_terminal() {
                self.summarize.enqueue(&resource.uri).await?;
                resumed += 1;
            }
        }
        if resumed > 0 {
            info!(resumed, "re-enqueued unfinished work");
        }
        Ok(())
    }

    pub fn root(&self) -> &ResourceUri {
        self.resolver.root()
    }

    /// Parse a caller-supplied URI and require it to lie under this
    /// database's root.
    pub fn parse_uri(&self, s: &str) -> Result<ResourceUri, ContextError> {
        let uri = ResourceUri::parse(s.trim())?;
        if !self.root().contains(&uri) {
            return Err(ContextError::InvalidUri(format!(
                "{} is outside {}",
                s,
                self.root()
            )));
        }
        Ok(uri)
    }

    // ============ Ingestion ============

    /// Add one file or URL. Never fails; the outcome is in the result.
    pub async fn add_resource(&self, target: &str, parent: Option<&str>) -> AddResult {
        match self.try_add(target, parent).await {
            Ok(uri) => AddResult::success(uri),
            Err(e) => {
                let (status, uri) = match ContextError::find(&e) {
                    Some(ContextError::Collision { uri, .. }) => {
                        (AddStatus::Collision, ResourceUri::parse(uri).ok())
                    }
                    _ => (AddStatus::Failed, None),
                };
                warn!(origin = target, error = %format!("{:#}", e), "add failed");
                AddResult {
                    status,
                    uri,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    async fn try_add(&self, target: &str, parent: Option<&str>) -> Result<ResourceUri> {
        let origin = origin::classify(target)?;
        let uri = self.resolver.compose(&origin, parent)?;
        let loaded = origin::load(&origin, self.fetch_timeout).await?;
        let hash = loaded.hash();

        // Serializes concurrent adds that compute the same URI.
        let _guard = self.add_locks.lock(uri.as_str()).await;
        let minted = self
            .resolver
            .mint(self.store.as_ref(), &origin, parent)
            .await?;

        if minted.existing {
            if let Some(existing) = self.store.get(&minted.uri).await? {
                if existing.content_hash == hash
                    && existing.embed_status == PipelineStatus::Done
                    && existing.summary_status == PipelineStatus::Done
                {
                    info!(uri = %minted.uri, "resource unchanged");
                    return Ok(minted.uri);
                }
            }
        }

        let now = Utc::now().timestamp();
        let resource = Resource {
            uri: minted.uri.clone(),
            origin,
            content_type: loaded.content_type.clone(),
            content_hash: hash,
            size: loaded.size(),
            embed_status: PipelineStatus::Pending,
            embed_error: None,
            summary_status: PipelineStatus::Pending,
            summary_error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.put(&resource, &loaded.text).await?;
        self.embed.enqueue(&minted.uri).await?;
        self.summarize.enqueue(&minted.uri).await?;

        info!(
            uri = %minted.uri,
            size = resource.size,
            refreshed = minted.existing,
            "resource added"
        );
        Ok(minted.uri)
    }

    /// Block until all work in `scope` that is outstanding now is terminal.
    pub async fn wait_processed(&self, scope: JoinScope) -> JoinSummary {
        self.tracker.join(&scope).await
    }

    /// Re-enqueue one pipeline for one resource.
    pub async fn reprocess(&self, uri: &ResourceUri, kind: PipelineKind) -> Result<WorkItem> {
        self.store.require(uri).await?;
        match kind {
            PipelineKind::Embed => self.embed.enqueue(uri).await,
            PipelineKind::Summarize => self.summarize.enqueue(uri).await,
        }
    }

    /// Re-enqueue every failed pipeline. Returns the number of work items.
    pub async fn retry_failed(&self) -> Result<usize> {
        let mut count = 0;
        for resource in self.store.resources().await? {
            for kind in [PipelineKind::Embed, PipelineKind::Summarize] {
                if resource.status(kind) == PipelineStatus::Failed {
                    self.reprocess(&resource.uri, kind).await?;
                    count += 1;
                }
            }
        }
        info!(count, "re-enqueued failed work");
        Ok(count)
    }

    // ============ Retrieval ============

    /// Semantic search. The query is embedded on demand, not through the
    /// pipeline. An empty query returns no hits.
    pub async fn find(
        &self,
        query: &str,
        limit: Option<usize>,
        scope: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let limit = limit.unwrap_or(self.default_limit);
        let scope = scope.map(|s| self.parse_uri(s)).transpose()?;
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        Ok(self.index.query(&vector, limit, scope.as_ref()))
    }

    /// Children of `uri` (the root when `None`), ordered by name.
    pub async fn ls(&self, uri: Option<&str>) -> Result<Vec<ListEntry>> {
        let uri = match uri {
            Some(s) => self.parse_uri(s)?,
            None => self.root().clone(),
        };
        let entries = self.store.list(&uri).await?;
        if entries.is_empty() && !uri.is_root() && self.store.get(&uri).await?.is_none() {
            return Err(ContextError::NotFound(uri.to_string()).into());
        }
        Ok(entries)
    }

    /// Raw content (L2).
    pub async fn read(&self, uri: &str) -> Result<String> {
        let uri = self.parse_uri(uri)?;
        self.store
            .content(&uri)
            .await?
            .ok_or_else(|| ContextError::NotFound(uri.to_string()).into())
    }

    /// L0 abstract.
    pub async fn abstract_(&self, uri: &str) -> Result<String> {
        self.summary(uri, SummaryLevel::Abstract).await
    }

    /// L1 overview.
    pub async fn overview(&self, uri: &str) -> Result<String> {
        self.summary(uri, SummaryLevel::Overview).await
    }

    async fn summary(&self, uri: &str, level: SummaryLevel) -> Result<String> {
        let uri = self.parse_uri(uri)?;
        let resource = self.store.require(&uri).await?;
        if resource.summary_status == PipelineStatus::Failed {
            return Err(ContextError::NotFound(format!(
                "{} of {}: summarization failed",
                level, uri
            ))
            .into());
        }
        self.store
            .get_summary(&uri, level)
            .await?
            .ok_or_else(|| ContextError::NotFound(format!("{} of {}", level, uri)).into())
    }

    pub async fn status(&self, uri: &str) -> Result<Resource> {
        let uri = self.parse_uri(uri)?;
        self.store.require(&uri).await
    }

    pub async fn info(&self) -> Result<Stats> {
        let resources = self.store.resources().await?;
        let mut embedding = StatusCounts::default();
        let mut summarization = StatusCounts::default();
        for r in &resources {
            embedding.record(r.embed_status);
            summarization.record(r.summary_status);
        }
        let in_flight = self.tracker.in_flight(&JoinScope::All);
        let active = in_flight
            .iter()
            .filter(|(_, state)| *state == WorkState::Running)
            .count();
        Ok(Stats {
            resources: resources.len(),
            embedding,
            summarization,
            indexed: self.index.len(),
            outstanding: in_flight.len(),
            queued: in_flight.len() - active,
            active,
            embedding_model: self.embedder.model_name().to_string(),
            summarization_model: self.summarizer.model_name().to_string(),
        })
    }

    /// Resources in scope, ordered by URI.
    pub async fn resources(&self, scope: &JoinScope) -> Result<Vec<Resource>> {
        Ok(self
            .store
            .resources()
            .await?
            .into_iter()
            .filter(|r| scope.matches(&r.uri))
            .collect())
    }
}
