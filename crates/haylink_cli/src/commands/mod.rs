//! CLI command implementations.

pub mod demo;
pub mod render;
pub mod site;
pub mod tree;
