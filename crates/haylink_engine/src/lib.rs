//! # haylink Engine
//!
//! Watch/poll synchronization and lazy navigation for haylink.
//!
//! This crate provides:
//! - A connection capability that hands out a connected client and reconnects
//! - The subscription registry (entity ref → tree node bindings, replayed on reconnect)
//! - The poll loop that reconciles changed rows into node children
//! - The navigation crawler that discovers the remote hierarchy on demand
//! - Read, eval, history, invoke and point-write call-throughs
//!
//! ## Architecture
//!
//! A [`Connector`] owns one of each component for one remote server:
//!
//! 1. [`ConnectionManager`] emits `Connected` / `Closed` events
//! 2. On `Connected` a watch is opened, every binding is re-added and polling is armed
//! 3. [`PollLoop`] pulls changed rows and rewrites the bound nodes' children
//! 4. [`NavigationCrawler`] creates nodes as they are listed and wires identity
//!    leaves to [`SubscriptionRegistry::subscribe`] / [`SubscriptionRegistry::unsubscribe`]
//!
//! ## Key Invariants
//!
//! - At most one binding per entity ref; re-subscribing replaces the node
//! - At most one active watch per connector
//! - Poll cycles never overlap and re-arming always cancels the previous schedule
//! - Background failures never reach unrelated callers; they only pause updates
//!   until the next reconnect

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod actions;
mod client;
mod config;
mod connection;
mod connector;
mod error;
mod mapper;
mod nav;
mod poll;
mod registry;
mod watch;

pub use actions::{InvokeArgs, PointWriteParams, Table};
pub use client::{ClientFactory, MockClient, MockFactory, RemoteClient};
pub use config::{ConnectionParams, ConnectorConfig, RetryConfig, DEFAULT_POLL_INTERVAL};
pub use connection::{ConnectionEvent, ConnectionManager};
pub use connector::Connector;
pub use error::{SyncError, SyncResult};
pub use mapper::map_value;
pub use nav::NavigationCrawler;
pub use poll::{poll_cycle, reconcile_row, CycleStats, PollFailureHook, PollLoop};
pub use registry::SubscriptionRegistry;
pub use watch::Watch;
