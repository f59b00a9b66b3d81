//! Background worker pools for the embedding and summarization pipelines.
//!
//! A [`Pipeline`] owns an unbounded queue of [`WorkItem`]s and a dispatcher
//! task that spawns one worker per item, bounded by a semaphore. Per item:
//!
//! 1. take the per-URI lock (one in-flight item per resource per kind)
//! 2. mark the item and the stored status `running`
//! 3. call [`Processor::process`] in its own task, retrying transient
//!    errors with exponential backoff up to the configured attempt budget;
//!    a panic in that task counts as a failed attempt with no retry
//! 4. write the terminal status (`done` / `failed` + error)
//! 5. report the outcome to the [`CompletionTracker`]
//!
//! Step 4 always precedes step 5, so a join that returns has terminal
//! statuses behind it.

pub mod embed;
pub mod summarize;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use context_db_core::models::{PipelineKind, PipelineStatus};
use context_db_core::store::ResourceStore;
use context_db_core::{ContextError, ResourceUri};

use crate::config::PipelineOptions;
use crate::locks::KeyedLocks;
use crate::tracker::{CompletionTracker, WorkItem};

/// The per-resource work one pipeline performs.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    fn kind(&self) -> PipelineKind;

    /// Called before a resource is queued.
    async fn on_enqueue(&self, _uri: &ResourceUri) {}

    /// One attempt at producing this pipeline's output for `uri`.
    async fn process(&self, uri: &ResourceUri) -> Result<()>;

    /// Called once after the retry budget is exhausted.
    async fn on_failure(&self, uri: &ResourceUri, err: &anyhow::Error);
}

/// Errors that will not change on retry.
pub fn is_permanent(err: &anyhow::Error) -> bool {
    matches!(
        ContextError::find(err),
        Some(
            ContextError::Provider(_)
                | ContextError::NotFound(_)
                | ContextError::PipelineFailure { .. }
                | ContextError::UnsupportedOrigin(_)
        )
    )
}

struct Worker {
    processor: Arc<dyn Processor>,
    store: Arc<dyn ResourceStore>,
    tracker: Arc<CompletionTracker>,
    options: PipelineOptions,
    locks: KeyedLocks,
}

pub struct Pipeline {
    kind: PipelineKind,
    worker: Arc<Worker>,
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl Pipeline {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    pub fn start(
        processor: Arc<dyn Processor>,
        store: Arc<dyn ResourceStore>,
        tracker: Arc<CompletionTracker>,
        options: PipelineOptions,
    ) -> Self {
        let kind = processor.kind();
        let concurrency = options.concurrency.max(1);
        let worker = Arc::new(Worker {
            processor,
            store,
            tracker,
            options,
            locks: KeyedLocks::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(worker.clone(), rx, concurrency));
        debug!(pipeline = %kind, concurrency, "pipeline started");
        Self { kind, worker, tx }
    }

    /// Mark `uri` pending, register a work item, and queue it.
    pub async fn enqueue(&self, uri: &ResourceUri) -> Result<WorkItem> {
        let worker = &self.worker;
        worker.processor.on_enqueue(uri).await;
        worker
            .store
            .set_status(uri, self.kind, PipelineStatus::Pending, None)
            .await?;
        let item = worker.tracker.register(uri.clone(), self.kind);
        if self.tx.send(item.clone()).is_err() {
            worker.tracker.complete(item.id, false);
            bail!("{} pipeline is shut down", self.kind);
        }
        Ok(item)
    }
}

async fn dispatch(worker: Arc<Worker>, mut rx: mpsc::UnboundedReceiver<WorkItem>, concurrency: usize) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    while let Some(item) = rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let worker = worker.clone();
        tokio::spawn(async move {
            worker.run(item).await;
            drop(permit);
        });
    }
}

impl Worker {
    async fn run(self: Arc<Self>, item: WorkItem) {
        let kind = self.processor.kind();
        let _guard = self.locks.lock(item.uri.as_str()).await;

        self.tracker.mark_running(item.id);
        if let Err(e) = self
            .store
            .set_status(&item.uri, kind, PipelineStatus::Running, None)
            .await
        {
            warn!(uri = %item.uri, pipeline = %kind, error = %e, "could not mark running");
        }

        let task = {
            let worker = Arc::clone(&self);
            let uri = item.uri.clone();
            tokio::spawn(async move { worker.attempt(&uri).await })
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ContextError::PipelineFailure {
                pipeline: kind,
                uri: item.uri.to_string(),
                message: format!("worker aborted: {}", e),
            }
            .into()),
        };
        let succeeded = outcome.is_ok();
        let (status, message) = match &outcome {
            Ok(()) => (PipelineStatus::Done, None),
            Err(e) => (PipelineStatus::Failed, Some(format!("{:#}", e))),
        };
        if let Err(e) = self
            .store
            .set_status(&item.uri, kind, status, message.as_deref())
            .await
        {
            warn!(uri = %item.uri, pipeline = %kind, error = %e, "could not record terminal status");
        }

        match outcome {
            Ok(()) => info!(uri = %item.uri, pipeline = %kind, "processed"),
            Err(e) => self.processor.on_failure(&item.uri, &e).await,
        }
        self.tracker.complete(item.id, succeeded);
    }

    async fn attempt(&self, uri: &ResourceUri) -> Result<()> {
        let kind = self.processor.kind();
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.processor.process(uri).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts || is_permanent(&e) => return Err(e),
                Err(e) => {
                    let delay = self.options.backoff_for(attempt);
                    warn!(
                        uri = %uri,
                        pipeline = %kind,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
