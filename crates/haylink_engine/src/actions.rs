//! Read, eval, history, invoke and point-write call-throughs.
//!
//! These functions validate caller input, make one blocking remote call and
//! turn the resulting grid into a [`Table`]. Input problems are reported as
//! [`SyncError::InvalidRequest`] before anything is sent.

use crate::client::RemoteClient;
use crate::error::{SyncError, SyncResult};
use crate::mapper::map_value;
use haylink_protocol::{
    DurationUnit, EntityRef, Grid, PointWriteRequest, ProtocolError, Row, Value, ValueKind,
    WriteLevel,
};
use haylink_tree::NodeValue;

/// Rows returned by `read` when no limit is given.
pub const DEFAULT_READ_LIMIT: usize = 1;

/// Columns of the point-write result row.
pub const POINT_WRITE_COLUMNS: [&str; 4] = ["level", "levelDis", "val", "who"];

/// A tabular action result with local values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column names in order.
    pub columns: Vec<String>,
    /// One entry per column per row; `None` where the row has no cell.
    pub rows: Vec<Vec<Option<NodeValue>>>,
}

impl Table {
    /// Builds a table from a grid, keeping every grid column.
    pub fn from_grid(grid: &Grid) -> Self {
        let columns = grid.columns().to_vec();
        let rows = grid
            .rows()
            .iter()
            .map(|row| project(row, columns.as_slice()))
            .collect();
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cell at `row` in the named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&NodeValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }
}

impl From<&Grid> for Table {
    fn from(grid: &Grid) -> Self {
        Table::from_grid(grid)
    }
}

fn project<S: AsRef<str>>(row: &Row, columns: &[S]) -> Vec<Option<NodeValue>> {
    columns
        .iter()
        .map(|c| row.get(c.as_ref()).map(map_value))
        .collect()
}

/// Optional arguments passed to an invoked action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeArgs {
    /// String argument.
    pub str: Option<String>,
    /// Boolean argument.
    pub bool: Option<bool>,
    /// Number argument.
    pub number: Option<f64>,
}

impl InvokeArgs {
    /// The argument row; only supplied arguments are present.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        if let Some(s) = &self.str {
            row.set("str", s.as_str());
        }
        if let Some(b) = self.bool {
            row.set("bool", b);
        }
        if let Some(n) = self.number {
            row.set("number", n);
        }
        row
    }
}

/// Unvalidated point-write input, as a caller supplies it.
#[derive(Debug, Clone, PartialEq)]
pub struct PointWriteParams {
    /// Target point id, with or without `@`.
    pub id: String,
    /// Level, `"1"` to `"17"`.
    pub level: String,
    /// Literal to write; `None` releases the level.
    pub value: Option<String>,
    /// `bool`, `number` or `str`; required when `value` is set.
    pub value_type: Option<String>,
    /// Unit for number values.
    pub unit: Option<String>,
    /// Who performed the write.
    pub who: Option<String>,
    /// Override duration; whole units only.
    pub duration: Option<f64>,
    /// Unit for `duration`; required when `duration` is set.
    pub duration_unit: Option<String>,
}

impl PointWriteParams {
    /// Creates a release of the default level on `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level: WriteLevel::DEFAULT.get().to_string(),
            value: None,
            value_type: None,
            unit: None,
            who: None,
            duration: None,
            duration_unit: None,
        }
    }

    /// Sets the level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the value literal and its type.
    pub fn with_value(mut self, value: impl Into<String>, value_type: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self.value_type = Some(value_type.into());
        self
    }

    /// Sets the unit for a number value.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets who performed the write.
    pub fn with_who(mut self, who: impl Into<String>) -> Self {
        self.who = Some(who.into());
        self
    }

    /// Sets the override duration and its unit.
    pub fn with_duration(mut self, amount: f64, unit: impl Into<String>) -> Self {
        self.duration = Some(amount);
        self.duration_unit = Some(unit.into());
        self
    }

    /// Validates the input into a request.
    pub fn to_request(&self) -> SyncResult<PointWriteRequest> {
        let id = EntityRef::parse(&self.id).map_err(invalid)?;
        let level: WriteLevel = self.level.parse().map_err(invalid)?;

        let value = match &self.value {
            None => None,
            Some(literal) => {
                let kind = self
                    .value_type
                    .as_deref()
                    .ok_or_else(|| SyncError::InvalidRequest("missing value type".into()))?;
                let kind: ValueKind = kind.parse().map_err(invalid)?;
                Some(
                    kind.parse_literal(literal, self.unit.as_deref())
                        .map_err(invalid)?,
                )
            }
        };

        let mut request = match value {
            Some(value) => PointWriteRequest::write(id, level, value),
            None => PointWriteRequest::release(id, level),
        };
        if let Some(who) = &self.who {
            request = request.with_who(who.as_str());
        }
        if let Some(amount) = self.duration {
            if !(amount.is_finite() && amount >= 0.0) {
                return Err(SyncError::InvalidRequest(format!(
                    "invalid duration {amount}"
                )));
            }
            let unit = self
                .duration_unit
                .as_deref()
                .ok_or_else(|| SyncError::InvalidRequest("missing duration unit".into()))?;
            let unit: DurationUnit = unit.parse().map_err(invalid)?;
            request = request.with_duration(amount.trunc(), unit);
        }
        Ok(request)
    }
}

fn invalid(err: ProtocolError) -> SyncError {
    SyncError::InvalidRequest(err.to_string())
}

fn parse_id(id: &str) -> SyncResult<EntityRef> {
    EntityRef::parse(id).map_err(invalid)
}

/// Reads entities matching `filter`, at most `limit` (default 1).
pub fn read(client: &dyn RemoteClient, filter: &str, limit: Option<usize>) -> SyncResult<Table> {
    if filter.trim().is_empty() {
        return Err(SyncError::InvalidRequest("filter must not be empty".into()));
    }
    let limit = limit.unwrap_or(DEFAULT_READ_LIMIT);
    Ok(Table::from_grid(&client.read_all(filter, Some(limit))?))
}

/// Evaluates an expression.
pub fn eval(client: &dyn RemoteClient, expr: &str) -> SyncResult<Table> {
    if expr.trim().is_empty() {
        return Err(SyncError::InvalidRequest("expression must not be empty".into()));
    }
    Ok(Table::from_grid(&client.eval(expr)?))
}

/// Reads history for `id` over `range`.
pub fn his_read(client: &dyn RemoteClient, id: &str, range: &str) -> SyncResult<Table> {
    let id = parse_id(id)?;
    Ok(Table::from_grid(&client.his_read(&id, range)?))
}

/// Invokes `action` on `id`.
pub fn invoke(
    client: &dyn RemoteClient,
    id: &str,
    action: &str,
    args: &InvokeArgs,
) -> SyncResult<Table> {
    let id = parse_id(id)?;
    if action.trim().is_empty() {
        return Err(SyncError::InvalidRequest("action name must not be empty".into()));
    }
    Ok(Table::from_grid(&client.invoke_action(&id, action, &args.to_row())?))
}

/// Writes or releases a level; returns the resulting state of that level.
pub fn point_write(client: &dyn RemoteClient, params: &PointWriteParams) -> SyncResult<Table> {
    let request = params.to_request()?;
    let grid = client.point_write(&request)?;
    point_write_result(&grid, request.level)
}

/// Extracts the row for `level` from a returned priority array.
pub fn point_write_result(grid: &Grid, level: WriteLevel) -> SyncResult<Table> {
    let row = grid.row(level.index()).ok_or_else(|| {
        SyncError::ServerError(format!(
            "priority array has {} levels, expected {}",
            grid.len(),
            WriteLevel::COUNT
        ))
    })?;
    Ok(Table {
        columns: POINT_WRITE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: vec![project(row, &POINT_WRITE_COLUMNS[..])],
    })
}

/// Builds a priority array row, as servers report it.
pub fn level_row(level: WriteLevel, value: Option<Value>, who: Option<&str>) -> Row {
    let mut row = Row::new()
        .with("level", f64::from(level.get()))
        .with("levelDis", format!("Level {}", level.get()));
    if let Some(value) = value {
        row.set("val", value);
    }
    if let Some(who) = who {
        row.set("who", who);
    }
    row
}
