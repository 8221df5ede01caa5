//! Tree command implementation.

use super::render::{self, OutputFormat};
use super::site;
use haylink_tree::MemoryNode;
use tracing::info;

/// Runs the tree command.
pub async fn run(depth: usize, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let server = site::sample_server();
    let root = MemoryNode::root("site");
    let connector = site::connect(&server, &root, site::config("tree").with_nav_depth(depth)).await?;

    let discovered = connector.navigate_root().await??;
    info!(discovered, depth, "site navigated");

    let snapshot = root.snapshot();
    render::emit(format, &snapshot, || render::tree_text(&snapshot))?;
    connector.destroy();
    Ok(())
}
