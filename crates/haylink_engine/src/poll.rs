//! Periodic watch polling and row reconciliation.

use crate::error::{SyncError, SyncResult};
use crate::mapper::map_value;
use crate::registry::SubscriptionRegistry;
use crate::watch::Watch;
use haylink_protocol::{Row, ID_COLUMN};
use haylink_tree::{encode_name, TreeNode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked when a poll cycle fails, with the watch that failed.
pub type PollFailureHook = Arc<dyn Fn(Arc<Watch>, SyncError) + Send + Sync>;

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    /// Rows returned by the watch.
    pub rows: usize,
    /// Rows applied to a bound node.
    pub applied: usize,
}

/// Reconciles `node`'s children against one changed row.
///
/// Every column except the identity column is written to the child of the same
/// (encoded) name, creating it as non-persistent if needed. Children whose
/// name no longer appears in the row are removed afterwards. The identity
/// child is left alone.
pub fn reconcile_row(node: &dyn TreeNode, row: &Row) {
    let mut leftover: HashSet<String> = node.child_names().into_iter().collect();

    for (name, value) in row.cells() {
        let encoded = encode_name(name);
        leftover.remove(&encoded);
        if name == ID_COLUMN {
            continue;
        }

        let mapped = map_value(value);
        let child = match node.child(&encoded) {
            Some(child) => child,
            None => {
                let child = node.create_child(&encoded);
                child.set_serializable(false);
                child
            }
        };
        child.set_value_type(mapped.value_type());
        child.set_value(mapped);
    }

    for name in leftover {
        debug!(path = node.path(), child = %name, "removing stale child");
        node.remove_child(&name);
    }
}

/// Runs one poll cycle against `watch`, blocking.
pub fn poll_cycle(registry: &SubscriptionRegistry, watch: &Watch) -> SyncResult<CycleStats> {
    let mut stats = CycleStats::default();
    let Some(grid) = watch.poll_changes()? else {
        return Ok(stats);
    };

    stats.rows = grid.len();
    for row in grid.rows() {
        let Some(id) = row.id() else {
            continue;
        };
        let Some(node) = registry.lookup(id) else {
            debug!(entity = %id, "poll row has no binding");
            continue;
        };
        debug!(entity = %id, path = node.path(), columns = row.len(), "applying poll row");
        reconcile_row(node.as_ref(), row);
        stats.applied += 1;
    }
    Ok(stats)
}

/// The recurring poll schedule for one connector.
///
/// Cycles run with a fixed delay: the next cycle is timed from the end of the
/// previous one, and a cycle never starts while another is still running,
/// even across [`arm`] calls.
///
/// [`arm`]: PollLoop::arm
pub struct PollLoop {
    registry: Arc<SubscriptionRegistry>,
    runtime: Handle,
    task: Mutex<Option<(u64, JoinHandle<()>)>>,
    generation: AtomicU64,
    cycle: Arc<Mutex<()>>,
    on_failure: RwLock<Option<PollFailureHook>>,
}

impl PollLoop {
    /// Creates an unarmed poll loop.
    pub fn new(registry: Arc<SubscriptionRegistry>, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            registry,
            runtime,
            task: Mutex::new(None),
            generation: AtomicU64::new(0),
            cycle: Arc::new(Mutex::new(())),
            on_failure: RwLock::new(None),
        })
    }

    /// Sets the hook called after a failed cycle has stopped the loop.
    pub fn set_on_failure(&self, hook: Option<PollFailureHook>) {
        *self.on_failure.write() = hook;
    }

    /// (Re)starts the schedule, cancelling any pending cycle first.
    pub fn arm(self: &Arc<Self>, interval: Duration) {
        let mut task = self.task.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        if let Some((_, previous)) = task.take() {
            previous.abort();
        }
        debug!(?interval, generation, "poll armed");
        let handle = self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !this.run_cycle(generation).await {
                    break;
                }
            }
        });
        *task = Some((generation, handle));
    }

    /// Cancels the schedule without waiting for an in-flight cycle.
    pub fn cancel(&self) {
        let mut task = self.task.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some((_, previous)) = task.take() {
            previous.abort();
            debug!("poll cancelled");
        }
    }

    /// Returns true while a schedule is armed.
    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Returns false when the schedule must stop.
    async fn run_cycle(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        let Some(watch) = self.registry.current_watch() else {
            return true;
        };
        if self.registry.is_empty() {
            return true;
        }

        let registry = Arc::clone(&self.registry);
        let cycle = Arc::clone(&self.cycle);
        let polled = Arc::clone(&watch);
        let result = tokio::task::spawn_blocking(move || {
            let _running = cycle.lock();
            poll_cycle(&registry, &polled)
        })
        .await
        .map_err(SyncError::from)
        .and_then(|r| r);

        match result {
            Ok(stats) => {
                if stats.rows > 0 {
                    debug!(rows = stats.rows, applied = stats.applied, "poll cycle");
                }
                true
            }
            Err(err) => {
                warn!(watch = watch.id(), error = %err, "poll failed, stopping schedule");
                self.registry.clear_watch_if(&watch);
                {
                    let mut task = self.task.lock();
                    if task.as_ref().is_some_and(|(g, _)| *g == generation) {
                        task.take();
                    }
                }
                let hook = self.on_failure.read().clone();
                if let Some(hook) = hook {
                    hook(watch, err);
                }
                false
            }
        }
    }
}
