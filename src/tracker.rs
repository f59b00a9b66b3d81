//! Completion tracking for pipeline work items.
//!
//! Every enqueue registers a [`WorkItem`]; every terminal transition calls
//! [`CompletionTracker::complete`]. A join snapshots the items in scope and
//! attaches one shared countdown to each of them. Snapshot and terminal
//! removal happen under the same mutex, so an item is either counted and
//! later decremented exactly once, or already gone and never counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use context_db_core::models::PipelineKind;
use context_db_core::ResourceUri;

/// Which work items a join waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinScope {
    /// Everything outstanding at call time.
    All,
    /// One resource, both pipelines.
    Resource(ResourceUri),
    /// A URI and every resource below it.
    Subtree(ResourceUri),
}

impl JoinScope {
    pub fn matches(&self, uri: &ResourceUri) -> bool {
        match self {
            JoinScope::All => true,
            JoinScope::Resource(target) => target == uri,
            JoinScope::Subtree(prefix) => prefix.contains(uri),
        }
    }
}

/// Handle for one enqueued unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub uri: ResourceUri,
    pub kind: PipelineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkState {
    Queued,
    Running,
}

/// What a join observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinSummary {
    pub waited: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct Countdown {
    remaining: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    notify: Notify,
}

impl Countdown {
    fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn arrive(&self, succeeded: bool) {
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Tracked {
    uri: ResourceUri,
    kind: PipelineKind,
    state: WorkState,
    waiters: Vec<Arc<Countdown>>,
}

#[derive(Default)]
pub struct CompletionTracker {
    next_id: AtomicU64,
    items: Mutex<HashMap<u64, Tracked>>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, uri: ResourceUri, kind: PipelineKind) -> WorkItem {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items.lock().unwrap().insert(
            id,
            Tracked {
                uri: uri.clone(),
                kind,
                state: WorkState::Queued,
                waiters: Vec::new(),
            },
        );
        debug!(id, uri = %uri, pipeline = %kind, "work item queued");
        WorkItem { id, uri, kind }
    }

    pub fn mark_running(&self, id: u64) {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.state = WorkState::Running;
        }
    }

    /// Record a terminal transition. Unknown or already-completed ids are
    /// ignored.
    pub fn complete(&self, id: u64, succeeded: bool) {
        let removed = self.items.lock().unwrap().remove(&id);
        if let Some(item) = removed {
            debug!(id, uri = %item.uri, pipeline = %item.kind, succeeded, "work item finished");
            for waiter in item.waiters {
                waiter.arrive(succeeded);
            }
        }
    }

    /// Non-terminal items in scope with their state, ordered by id.
    pub fn in_flight(&self, scope: &JoinScope) -> Vec<(WorkItem, WorkState)> {
        let items = self.items.lock().unwrap();
        let mut out: Vec<_> = items
            .iter()
            .filter(|(_, item)| scope.matches(&item.uri))
            .map(|(id, item)| {
                (
                    WorkItem {
                        id: *id,
                        uri: item.uri.clone(),
                        kind: item.kind,
                    },
                    item.state,
                )
            })
            .collect();
        out.sort_by_key(|(item, _)| item.id);
        out
    }

    /// Wait until every item in scope that exists right now is terminal.
    ///
    /// Items registered after this call starts are not waited for.
    pub async fn join(&self, scope: &JoinScope) -> JoinSummary {
        let (countdown, waited) = {
            let mut items = self.items.lock().unwrap();
            let in_scope: Vec<&mut Tracked> = items
                .values_mut()
                .filter(|item| scope.matches(&item.uri))
                .collect();
            if in_scope.is_empty() {
                return JoinSummary::default();
            }
            let countdown = Arc::new(Countdown::new(in_scope.len()));
            let waited = in_scope.len();
            for item in in_scope {
                item.waiters.push(countdown.clone());
            }
            (countdown, waited)
        };

        countdown.wait().await;
        JoinSummary {
            waited,
            succeeded: countdown.succeeded.load(Ordering::SeqCst),
            failed: countdown.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn uri(s: &str) -> ResourceUri {
        ResourceUri::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_join_with_nothing_outstanding_returns_immediately() {
        let tracker = CompletionTracker::new();
        assert_eq!(tracker.join(&JoinScope::All).await, JoinSummary::default());
    }

    #[tokio::test]
    async fn test_join_counts_terminal_outcomes() {
        let tracker = Arc::new(CompletionTracker::new());
        let a = tracker.register(uri("ctx://resources/a"), PipelineKind::Embed);
        let b = tracker.register(uri("ctx://resources/a"), PipelineKind::Summarize);

        let t = tracker.clone();
        let join = tokio::spawn(async move { t.join(&JoinScope::All).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.mark_running(a.id);
        tracker.complete(a.id, true);
        tracker.complete(b.id, false);

        let summary = join.await.unwrap();
        assert_eq!(
            summary,
            JoinSummary {
                waited: 2,
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(tracker.in_flight(&JoinScope::All).len(), 0);
    }

    #[tokio::test]
    async fn test_join_ignores_work_enqueued_later() {
        let tracker = Arc::new(CompletionTracker::new());
        let first = tracker.register(uri("ctx://resources/a"), PipelineKind::Embed);

        let t = tracker.clone();
        let join = tokio::spawn(async move { t.join(&JoinScope::All).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let _late = tracker.register(uri("ctx://resources/b"), PipelineKind::Embed);
        tracker.complete(first.id, true);

        let summary = tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("join should not wait for late work")
            .unwrap();
        assert_eq!(summary.waited, 1);
        assert_eq!(tracker.in_flight(&JoinScope::All).len(), 1);
    }

    #[tokio::test]
    async fn test_resource_and_subtree_scopes() {
        let tracker = CompletionTracker::new();
        tracker.register(uri("ctx://resources/docs/a.md"), PipelineKind::Embed);
        tracker.register(uri("ctx://resources/docs/b.md"), PipelineKind::Embed);
        tracker.register(uri("ctx://resources/other.md"), PipelineKind::Embed);

        let docs = JoinScope::Subtree(uri("ctx://resources/docs"));
        assert_eq!(tracker.in_flight(&docs).len(), 2);
        let one = JoinScope::Resource(uri("ctx://resources/docs/a.md"));
        assert_eq!(tracker.in_flight(&one).len(), 1);
        assert_eq!(tracker.in_flight(&JoinScope::All).len(), 3);
    }

    #[tokio::test]
    async fn test_double_complete_is_ignored() {
        let tracker = Arc::new(CompletionTracker::new());
        let a = tracker.register(uri("ctx://resources/a"), PipelineKind::Embed);
        let b = tracker.register(uri("ctx://resources/b"), PipelineKind::Embed);

        let t = tracker.clone();
        let join = tokio::spawn(async move { t.join(&JoinScope::All).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.complete(a.id, true);
        tracker.complete(a.id, true);
        assert!(!join.is_finished());
        tracker.complete(b.id, true);

        let summary = join.await.unwrap();
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test]
    async fn test_in_flight_reports_state() {
        let tracker = CompletionTracker::new();
        let a = tracker.register(uri("ctx://resources/a"), PipelineKind::Embed);
        tracker.register(uri("ctx://resources/a"), PipelineKind::Summarize);
        tracker.mark_running(a.id);

        let states: Vec<WorkState> = tracker
            .in_flight(&JoinScope::All)
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert_eq!(states, vec![WorkState::Running, WorkState::Queued]);
    }
}
