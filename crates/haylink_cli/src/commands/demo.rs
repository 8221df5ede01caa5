//! Demo command implementation.

use super::render::{self, OutputFormat};
use super::site;
use haylink_tree::{MemoryNode, NodeSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tree state after one poll cycle.
#[derive(Debug, Serialize)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: usize,
    /// The whole tree.
    pub tree: NodeSnapshot,
}

/// Runs the demo command.
pub async fn run(
    polls: usize,
    interval_ms: u64,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = site::sample_server();
    let root = MemoryNode::root("demo");
    let config = site::config("demo")
        .with_poll_interval(Duration::from_millis(interval_ms))
        .with_nav_depth(2);
    let connector = site::connect(&server, &root, config).await?;

    let discovered = connector.navigate_root().await??;
    info!(discovered, "site navigated");

    // Act as a host observer on every identity leaf.
    let leaves = identity_leaves(&root);
    for leaf in &leaves {
        leaf.observe();
    }
    let points = site::point_ids();
    site::wait_for(
        || points.iter().all(|id| server.sub_requests(id) > 0),
        site::SETTLE_TIMEOUT,
    )
    .await?;

    for cycle in 1..=polls {
        if cycle > 1 {
            let updated = site::drift(&server, cycle);
            debug!(cycle, updated, "sample values changed");
        }
        // Two polls started after the change means one has fully applied it.
        let target = server.poll_requests() + 2;
        site::wait_for(|| server.poll_requests() >= target, site::SETTLE_TIMEOUT).await?;

        let report = CycleReport {
            cycle,
            tree: root.snapshot(),
        };
        render::emit(format, &report, || {
            format!("--- cycle {cycle} ---\n{}", render::tree_text(&report.tree))
        })?;
    }

    for leaf in &leaves {
        leaf.unobserve();
    }
    connector.destroy();
    Ok(())
}

/// Identity leaves wired for subscription, depth first.
fn identity_leaves(node: &MemoryNode) -> Vec<Arc<MemoryNode>> {
    let mut leaves = Vec::new();
    for child in node.nodes() {
        if child.has_subscription_hooks() {
            leaves.push(Arc::clone(&child));
        }
        leaves.extend(identity_leaves(&child));
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn finds_every_point_identity() {
        let server = site::sample_server();
        let root = MemoryNode::root("test");
        let connector = site::connect(&server, &root, site::config("test").with_nav_depth(2))
            .await
            .unwrap();
        connector.navigate_root().await.unwrap().unwrap();

        // Site, two equips and four points.
        assert_eq!(identity_leaves(&root).len(), 7);
        connector.destroy();
    }
}
