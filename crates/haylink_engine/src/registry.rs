//! Entity ref to tree node bindings and the active watch.

use crate::watch::Watch;
use haylink_protocol::EntityRef;
use haylink_tree::NodeRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Keeps remote watch membership consistent with locally interested nodes.
///
/// Bindings survive disconnects. Every binding is replayed as a remote add
/// when a new watch is installed with [`on_connect`].
///
/// Remote adds and removes are fire-and-forget: they run on the blocking pool,
/// never block the caller and are never retried. A failed add means the
/// entity gets no updates until the next replay.
///
/// [`on_connect`]: SubscriptionRegistry::on_connect
pub struct SubscriptionRegistry {
    bindings: RwLock<HashMap<EntityRef, NodeRef>>,
    watch: RwLock<Option<Arc<Watch>>>,
    runtime: Handle,
}

impl SubscriptionRegistry {
    /// Creates an empty, disconnected registry.
    pub fn new(runtime: Handle) -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            watch: RwLock::new(None),
            runtime,
        }
    }

    /// Binds `id` to `node`, replacing any previous binding.
    ///
    /// If a watch is active, `id` is added to it in the background.
    pub fn subscribe(&self, id: EntityRef, node: NodeRef) {
        debug!(entity = %id, path = node.path(), "subscribe");
        self.bindings.write().insert(id.clone(), node);
        if let Some(watch) = self.current_watch() {
            self.spawn_add(watch, id);
        }
    }

    /// Removes the binding for `id`.
    ///
    /// If a watch is active, `id` is removed from it in the background.
    pub fn unsubscribe(&self, id: &EntityRef) {
        debug!(entity = %id, "unsubscribe");
        self.bindings.write().remove(id);
        if let Some(watch) = self.current_watch() {
            let id = id.clone();
            self.runtime.spawn_blocking(move || {
                if let Err(err) = watch.unsub(&id) {
                    warn!(entity = %id, watch = watch.id(), error = %err, "remote unsubscribe failed");
                }
            });
        }
    }

    /// Installs a freshly opened watch and replays every binding onto it.
    pub fn on_connect(&self, watch: Arc<Watch>) {
        *self.watch.write() = Some(Arc::clone(&watch));
        let ids = self.bindings();
        info!(watch = watch.id(), bindings = ids.len(), "watch opened");
        for id in ids {
            self.spawn_add(Arc::clone(&watch), id);
        }
    }

    /// Forgets the active watch. Bindings are kept for the next replay.
    pub fn on_disconnect(&self) -> Option<Arc<Watch>> {
        let previous = self.watch.write().take();
        if let Some(watch) = &previous {
            info!(watch = watch.id(), "watch cleared");
        }
        previous
    }

    /// Forgets the active watch only if it is still `watch`.
    ///
    /// Returns true if it was cleared.
    pub fn clear_watch_if(&self, watch: &Arc<Watch>) -> bool {
        let mut current = self.watch.write();
        match current.as_ref() {
            Some(active) if Arc::ptr_eq(active, watch) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the active watch.
    pub fn current_watch(&self) -> Option<Arc<Watch>> {
        self.watch.read().clone()
    }

    /// Returns the node bound to `id`.
    pub fn lookup(&self, id: &EntityRef) -> Option<NodeRef> {
        self.bindings.read().get(id).cloned()
    }

    /// Returns true if `id` is bound.
    pub fn contains(&self, id: &EntityRef) -> bool {
        self.bindings.read().contains_key(id)
    }

    /// Snapshot of the bound refs.
    pub fn bindings(&self) -> Vec<EntityRef> {
        self.bindings.read().keys().cloned().collect()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Drops every binding and the watch.
    pub fn clear(&self) {
        self.bindings.write().clear();
        self.watch.write().take();
    }

    fn spawn_add(&self, watch: Arc<Watch>, id: EntityRef) {
        self.runtime.spawn_blocking(move || match watch.sub(&id) {
            Ok(_) => debug!(entity = %id, watch = watch.id(), "remote subscribe"),
            Err(err) => {
                warn!(entity = %id, watch = watch.id(), error = %err, "remote subscribe failed")
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use crate::error::SyncError;
    use haylink_tree::{MemoryNode, TreeNode};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn node(name: &str) -> NodeRef {
        MemoryNode::root(name)
    }

    #[test]
    fn subscribe_while_disconnected_records_binding() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let registry = SubscriptionRegistry::new(rt.handle().clone());
        let r1 = EntityRef::new("r1");

        registry.subscribe(r1.clone(), node("a"));
        assert!(registry.contains(&r1));
        assert!(registry.current_watch().is_none());

        registry.unsubscribe(&r1);
        registry.unsubscribe(&r1);
        assert!(registry.is_empty());
    }

    #[test]
    fn resubscribe_replaces_node() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let registry = SubscriptionRegistry::new(rt.handle().clone());
        let r1 = EntityRef::new("r1");

        registry.subscribe(r1.clone(), node("a"));
        registry.subscribe(r1.clone(), node("b"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&r1).unwrap().name(), "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribe_with_watch_adds_remotely() {
        let client = Arc::new(MockClient::new());
        let registry = SubscriptionRegistry::new(Handle::current());
        registry.on_connect(Arc::new(Watch::open(client.clone(), "t", None).unwrap()));

        let r1 = EntityRef::new("r1");
        registry.subscribe(r1.clone(), node("a"));
        wait_until(|| client.sub_count(&r1) == 1).await;

        registry.unsubscribe(&r1);
        wait_until(|| client.unsub_count(&r1) == 1).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_replays_each_binding_once() {
        let client = Arc::new(MockClient::new());
        let registry = SubscriptionRegistry::new(Handle::current());
        let r1 = EntityRef::new("r1");
        let r2 = EntityRef::new("r2");
        let r3 = EntityRef::new("r3");
        registry.subscribe(r1.clone(), node("a"));
        registry.subscribe(r2.clone(), node("b"));
        registry.subscribe(r3.clone(), node("c"));

        registry.on_connect(Arc::new(Watch::open(client.clone(), "t", None).unwrap()));
        wait_until(|| client.sub_count(&r1) == 1 && client.sub_count(&r2) == 1).await;

        registry.on_disconnect();
        registry.unsubscribe(&r2);
        assert_eq!(client.unsub_count(&r2), 0);

        registry.on_connect(Arc::new(Watch::open(client.clone(), "t", None).unwrap()));
        wait_until(|| client.sub_count(&r1) == 2 && client.sub_count(&r3) == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.sub_count(&r1), 2);
        assert_eq!(client.sub_count(&r2), 1);
        assert_eq!(client.sub_count(&r3), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_add_does_not_block_others() {
        let client = Arc::new(MockClient::new());
        let registry = SubscriptionRegistry::new(Handle::current());
        let r1 = EntityRef::new("r1");
        let r2 = EntityRef::new("r2");
        registry.subscribe(r1.clone(), node("a"));
        registry.subscribe(r2.clone(), node("b"));

        client.fail_next_sub(SyncError::transport_retryable("dropped"));
        registry.on_connect(Arc::new(Watch::open(client.clone(), "t", None).unwrap()));

        // One add fails, the other still lands.
        wait_until(|| client.sub_count(&r1) + client.sub_count(&r2) == 1).await;
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn clear_watch_if_ignores_stale_watch() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let registry = SubscriptionRegistry::new(rt.handle().clone());
        let client = Arc::new(MockClient::new());
        let old = Arc::new(Watch::open(client.clone(), "t", None).unwrap());
        let new = Arc::new(Watch::open(client, "t", None).unwrap());

        registry.on_connect(Arc::clone(&new));
        assert!(!registry.clear_watch_if(&old));
        assert!(registry.current_watch().is_some());
        assert!(registry.clear_watch_if(&new));
        assert!(registry.current_watch().is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Sub(u8, u8),
        Unsub(u8),
        Connect,
        Disconnect,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..5, 0u8..5).prop_map(|(r, n)| Op::Sub(r, n)),
            (0u8..5).prop_map(Op::Unsub),
            Just(Op::Connect),
            Just(Op::Disconnect),
        ]
    }

    proptest! {
        #[test]
        fn bindings_are_last_write_wins(ops in proptest::collection::vec(op(), 0..40)) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .build()
                .unwrap();
            let registry = SubscriptionRegistry::new(rt.handle().clone());
            let client = Arc::new(MockClient::new());
            let mut model: BTreeMap<String, String> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Sub(r, n) => {
                        let name = format!("n{n}");
                        registry.subscribe(EntityRef::new(format!("r{r}")), node(&name));
                        model.insert(format!("r{r}"), name);
                    }
                    Op::Unsub(r) => {
                        registry.unsubscribe(&EntityRef::new(format!("r{r}")));
                        model.remove(&format!("r{r}"));
                    }
                    Op::Connect => {
                        let watch = Watch::open(client.clone(), "t", None).unwrap();
                        registry.on_connect(Arc::new(watch));
                    }
                    Op::Disconnect => {
                        registry.on_disconnect();
                    }
                }
            }

            let mut actual: BTreeMap<String, String> = BTreeMap::new();
            for id in registry.bindings() {
                let bound = registry.lookup(&id).unwrap();
                actual.insert(id.as_str().to_string(), bound.name().to_string());
            }
            prop_assert_eq!(actual, model);
        }
    }
}
