//! Output formatting shared by the commands.

use haylink_tree::NodeSnapshot;
use serde::Serialize;
use std::str::FromStr;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented tree.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?} (expected text or json)")),
        }
    }
}

/// Renders a subtree as indented `name = value` lines.
pub fn tree_text(snapshot: &NodeSnapshot) -> String {
    let mut out = String::new();
    write_node(&mut out, snapshot, 0);
    out
}

fn write_node(out: &mut String, node: &NodeSnapshot, depth: usize) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.name);
    if let Some(value) = &node.value {
        out.push_str(" = ");
        out.push_str(&value.to_string());
    }
    out.push('\n');
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

/// Prints `value` as JSON, or the text produced by `text`.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}
