//! Point-write requests.
//!
//! A writable point carries a 17-level priority array. A write sets or
//! releases one level; the lowest-numbered non-null level wins.

use crate::entity_ref::EntityRef;
use crate::error::{ProtocolError, ProtocolResult};
use crate::value::Value;
use std::str::FromStr;

/// A priority level in `1..=17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteLevel(u8);

impl WriteLevel {
    /// Highest priority.
    pub const HIGHEST: WriteLevel = WriteLevel(1);
    /// Default (lowest) priority.
    pub const DEFAULT: WriteLevel = WriteLevel(17);
    /// Number of levels in a priority array.
    pub const COUNT: usize = 17;

    /// Creates a level, rejecting values outside `1..=17`.
    pub fn new(level: u8) -> ProtocolResult<Self> {
        if (1..=17).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ProtocolError::InvalidLevel(level.to_string()))
        }
    }

    /// The numeric level.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into a priority array.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl FromStr for WriteLevel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidLevel(s.to_string()))?;
        Self::new(level)
    }
}

/// Kind of a literal supplied for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `true` / `false`.
    Bool,
    /// Floating point number, optionally with a unit.
    Number,
    /// Plain string.
    Str,
}

impl ValueKind {
    /// Names accepted by [`ValueKind::from_str`].
    pub const NAMES: [&'static str; 3] = ["bool", "number", "str"];

    /// Parses a literal of this kind into a remote value.
    pub fn parse_literal(self, literal: &str, unit: Option<&str>) -> ProtocolResult<Value> {
        match self {
            ValueKind::Bool => literal
                .trim()
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| ProtocolError::invalid_literal(literal, "bool")),
            ValueKind::Number => {
                let value: f64 = literal
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::invalid_literal(literal, "number"))?;
                Ok(Value::Number {
                    value,
                    unit: unit.filter(|u| !u.is_empty()).map(str::to_string),
                })
            }
            ValueKind::Str => Ok(Value::Str(literal.to_string())),
        }
    }
}

impl FromStr for ValueKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "bool" => Ok(ValueKind::Bool),
            "number" => Ok(ValueKind::Number),
            "str" => Ok(ValueKind::Str),
            other => Err(ProtocolError::UnknownValueKind(other.to_string())),
        }
    }
}

/// Unit of a timed override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    /// Milliseconds.
    Millis,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
    /// Weeks.
    Weeks,
    /// Months.
    Months,
    /// Years.
    Years,
}

impl DurationUnit {
    /// The unit symbol used on the wire.
    pub fn symbol(self) -> &'static str {
        match self {
            DurationUnit::Millis => "ms",
            DurationUnit::Seconds => "sec",
            DurationUnit::Minutes => "min",
            DurationUnit::Hours => "hr",
            DurationUnit::Days => "day",
            DurationUnit::Weeks => "wk",
            DurationUnit::Months => "mo",
            DurationUnit::Years => "yr",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        Ok(match s {
            "ms" => DurationUnit::Millis,
            "sec" => DurationUnit::Seconds,
            "min" => DurationUnit::Minutes,
            "hr" => DurationUnit::Hours,
            "day" => DurationUnit::Days,
            "wk" => DurationUnit::Weeks,
            "mo" => DurationUnit::Months,
            "yr" => DurationUnit::Years,
            other => return Err(ProtocolError::UnknownDurationUnit(other.to_string())),
        })
    }
}

/// A validated point write.
#[derive(Debug, Clone, PartialEq)]
pub struct PointWriteRequest {
    /// Target point.
    pub id: EntityRef,
    /// Priority level to set or release.
    pub level: WriteLevel,
    /// Value to write; `None` releases the level back to auto.
    pub value: Option<Value>,
    /// Who performed the write.
    pub who: Option<String>,
    /// Override duration as a number with a duration unit.
    pub duration: Option<Value>,
}

impl PointWriteRequest {
    /// Creates a release (null write) at the given level.
    pub fn release(id: EntityRef, level: WriteLevel) -> Self {
        Self {
            id,
            level,
            value: None,
            who: None,
            duration: None,
        }
    }

    /// Creates a write of `value` at the given level.
    pub fn write(id: EntityRef, level: WriteLevel, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::release(id, level)
        }
    }

    /// Sets who performed the write.
    pub fn with_who(mut self, who: impl Into<String>) -> Self {
        self.who = Some(who.into());
        self
    }

    /// Sets a timed override duration.
    pub fn with_duration(mut self, amount: f64, unit: DurationUnit) -> Self {
        self.duration = Some(Value::number_with_unit(amount, unit.symbol()));
        self
    }
}
