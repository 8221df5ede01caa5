//! # haylink Server
//!
//! In-memory reference server for the haylink connector.
//!
//! This crate provides:
//! - Entities, a navigation tree and a 17-level priority array per writable point
//! - Watch sessions with dirty tracking, leases and forced expiry
//! - A small filter language for reads (`tag`, `tag == literal`, joined by `and`)
//! - Registered eval results, history samples and per-entity actions
//! - A loopback client implementing the engine's client traits
//!
//! # Architecture
//!
//! The server keeps all state behind one lock. Request methods mirror the
//! remote calls the connector makes; mutation methods (`update`,
//! `remove_tag`, `set_online`, `expire_watches`) let tests and demos change
//! the world between polls.
//!
//! ```rust,ignore
//! use haylink_server::{LoopbackFactory, MemoryServer, ServerConfig};
//!
//! let server = MemoryServer::new(ServerConfig::default());
//! server.add_entity(Row::new().with("id", EntityRef::new("p1")).with("curVal", 72.0));
//! let factory = LoopbackFactory::new(Arc::clone(&server));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod filter;
mod loopback;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use filter::Filter;
pub use loopback::{LoopbackClient, LoopbackFactory};
pub use server::{Invocation, MemoryServer};
