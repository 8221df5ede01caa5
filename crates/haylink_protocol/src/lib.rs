//! # haylink Protocol
//!
//! Remote data types observed by the haylink connector.
//!
//! This crate provides:
//! - `Value` for remote typed values (markers, numbers with units, refs, ...)
//! - `EntityRef` for globally unique remote identifiers
//! - `Row` and `Grid` for the tabular results of nav, read, watch and poll calls
//! - `PointWriteRequest` and its validated parts (`WriteLevel`, `DurationUnit`)
//!
//! This is a pure data crate with no I/O operations. The wire format used to
//! move these values is owned by the transport, not by this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity_ref;
mod error;
mod grid;
mod point_write;
mod value;

pub use entity_ref::EntityRef;
pub use error::{ProtocolError, ProtocolResult};
pub use grid::{Grid, Row, ID_COLUMN, NAV_ID_COLUMN, PLACEHOLDER_DIS};
pub use point_write::{DurationUnit, PointWriteRequest, ValueKind, WriteLevel};
pub use value::Value;
