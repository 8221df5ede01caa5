//! Lazy discovery of the remote navigation hierarchy.

use crate::client::RemoteClient;
use crate::connection::ConnectionManager;
use crate::error::SyncResult;
use crate::mapper::map_value;
use crate::registry::SubscriptionRegistry;
use haylink_protocol::{EntityRef, Row, ID_COLUMN, PLACEHOLDER_DIS};
use haylink_tree::{encode_name, Hook, NodeRef, TreeNode};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Expands remote nav nodes into tree nodes when they are first observed.
///
/// Each expansion fetches the node's nav children and, while the depth budget
/// lasts, their children too. Every child that can be expanded further gets a
/// list hook so deeper levels load only when someone looks at them.
///
/// Re-expanding a node reconciles instead of duplicating: existing children
/// are reused, hooks are replaced, and nav children that disappeared from the
/// listing are removed. Removing a child also drops the bindings made
/// through identity leaves in its subtree.
pub struct NavigationCrawler {
    this: Weak<NavigationCrawler>,
    connection: Arc<ConnectionManager>,
    registry: Weak<SubscriptionRegistry>,
    runtime: Handle,
    depth: usize,
    discovered: Mutex<HashMap<String, HashSet<String>>>,
    identities: Mutex<HashMap<String, EntityRef>>,
}

impl NavigationCrawler {
    /// Creates a crawler with the given look-ahead depth.
    pub fn new(
        connection: Arc<ConnectionManager>,
        registry: &Arc<SubscriptionRegistry>,
        runtime: Handle,
        depth: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            connection,
            registry: Arc::downgrade(registry),
            runtime,
            depth,
            discovered: Mutex::new(HashMap::new()),
            identities: Mutex::new(HashMap::new()),
        })
    }

    /// Builds a list hook that expands `node` from `nav_id` (root when `None`).
    pub fn list_hook(&self, node: &NodeRef, nav_id: Option<String>) -> Hook {
        let crawler = self.this.clone();
        let node = Arc::downgrade(node);
        Arc::new(move || {
            let (Some(crawler), Some(node)) = (crawler.upgrade(), node.upgrade()) else {
                return;
            };
            crawler.navigate(node, nav_id.clone());
        })
    }

    /// Expands `node` in the background.
    pub fn navigate(&self, node: NodeRef, nav_id: Option<String>) -> JoinHandle<SyncResult<usize>> {
        let crawler = self.this.clone();
        self.runtime.spawn(async move {
            let Some(crawler) = crawler.upgrade() else {
                return Ok(0);
            };
            let path = node.path().to_string();
            let result = crawler.expand(node, nav_id).await;
            if let Err(err) = &result {
                warn!(path = %path, error = %err, "navigation failed");
            }
            result
        })
    }

    /// Expands `node` and returns the number of nav children materialized.
    ///
    /// An unsupported nav request leaves the node unexpanded and is not an error.
    pub async fn expand(&self, node: NodeRef, nav_id: Option<String>) -> SyncResult<usize> {
        match &nav_id {
            Some(id) => info!(nav_id = %id, path = node.path(), "navigating {} ({})", id, node.path()),
            None => info!("navigating root"),
        }

        let client = self.connection.client().await?;
        let Some(crawler) = self.this.upgrade() else {
            return Ok(0);
        };
        let depth = self.depth;
        let result = tokio::task::spawn_blocking(move || {
            crawler.expand_blocking(client.as_ref(), &node, nav_id.as_deref(), depth)
        })
        .await?;

        match result {
            Err(err) if err.is_nav_unsupported() => {
                info!(error = %err, "navigation unsupported, leaving node unexpanded");
                Ok(0)
            }
            other => other,
        }
    }

    /// Forgets what earlier expansions discovered.
    pub fn reset(&self) {
        self.discovered.lock().clear();
        self.identities.lock().clear();
    }

    fn expand_blocking(
        &self,
        client: &dyn RemoteClient,
        node: &NodeRef,
        nav_id: Option<&str>,
        budget: usize,
    ) -> SyncResult<usize> {
        let grid = client.nav(nav_id)?;
        let mut names = HashSet::new();

        for row in grid.rows() {
            let Some(name) = display_name(row) else {
                debug!(path = node.path(), "skipping unnamed nav row");
                continue;
            };
            let child = node.create_child(&name);
            names.insert(name);

            if let Some(child_nav) = row.nav_id() {
                child.set_on_list(Some(self.list_hook(&child, Some(child_nav.to_string()))));
                if budget > 0 {
                    match self.expand_blocking(client, &child, Some(child_nav), budget - 1) {
                        Err(err) if err.is_nav_unsupported() => {
                            debug!(nav_id = child_nav, error = %err, "look-ahead unsupported");
                        }
                        Err(err) => return Err(err),
                        Ok(_) => {}
                    }
                }
            }

            self.materialize_row(&child, row);
        }

        let count = names.len();
        self.prune(node.as_ref(), names);
        Ok(count)
    }

    /// Removes nav children found by the previous expansion but not this one.
    fn prune(&self, node: &dyn TreeNode, names: HashSet<String>) {
        let previous = self
            .discovered
            .lock()
            .insert(node.path().to_string(), names.clone());
        for stale in previous.into_iter().flatten().filter(|n| !names.contains(n)) {
            debug!(path = node.path(), child = %stale, "removing vanished nav child");
            if let Some(child) = node.remove_child(&stale) {
                self.forget_subtree(child.path());
            }
        }
    }

    /// Drops what was learned below `path` and unbinds its identity leaves.
    fn forget_subtree(&self, path: &str) {
        let below = format!("{path}/");
        let inside = |key: &str| key == path || key.starts_with(&below);

        self.discovered.lock().retain(|key, _| !inside(key));
        let mut released = Vec::new();
        self.identities.lock().retain(|key, id| {
            if inside(key) {
                released.push((key.clone(), id.clone()));
                false
            } else {
                true
            }
        });

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        for (key, id) in released {
            // Leave bindings that now point somewhere else alone.
            if registry.lookup(&id).is_some_and(|bound| bound.path() == key) {
                debug!(entity = %id, path = %key, "unbinding removed nav node");
                registry.unsubscribe(&id);
            }
        }
    }

    /// Writes the row's columns as leaf children and wires the identity leaf.
    fn materialize_row(&self, node: &NodeRef, row: &Row) {
        if let Some(id) = row.id() {
            self.identities
                .lock()
                .insert(node.path().to_string(), id.clone());
            let leaf = node.create_child(ID_COLUMN);
            if let Some(value) = row.get(ID_COLUMN) {
                let mapped = map_value(value);
                leaf.set_value_type(mapped.value_type());
                leaf.set_value(mapped);
            }
            leaf.set_serializable(false);

            let registry = self.registry.clone();
            let parent = Arc::downgrade(node);
            let entity = id.clone();
            leaf.set_on_subscribe(Some(Arc::new(move || {
                if let (Some(registry), Some(parent)) = (registry.upgrade(), parent.upgrade()) {
                    registry.subscribe(entity.clone(), parent);
                }
            })));

            let registry = self.registry.clone();
            let entity = id.clone();
            leaf.set_on_unsubscribe(Some(Arc::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.unsubscribe(&entity);
                }
            })));
        }

        for (name, value) in row.cells() {
            if name == ID_COLUMN {
                continue;
            }
            let leaf = node.create_child(&encode_name(name));
            let mapped = map_value(value);
            leaf.set_value_type(mapped.value_type());
            leaf.set_value(mapped);
            leaf.set_serializable(false);
        }
    }
}

/// Path-safe display name for a nav row, or `None` if it has no usable name.
fn display_name(row: &Row) -> Option<String> {
    let dis = row.dis();
    if dis.is_empty() || dis == PLACEHOLDER_DIS {
        return None;
    }
    Some(encode_name(&dis))
}
