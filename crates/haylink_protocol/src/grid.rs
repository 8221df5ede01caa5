//! Rows and grids of named remote values.

use crate::entity_ref::EntityRef;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Column carrying an entity's identity.
pub const ID_COLUMN: &str = "id";

/// Column carrying the opaque navigation token of a nav row.
pub const NAV_ID_COLUMN: &str = "navId";

/// Display text reported for rows that have no usable name.
pub const PLACEHOLDER_DIS: &str = "????";

/// One entity's current set of named attribute values.
///
/// Cells keep their insertion order. Setting an existing column replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a cell, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Adds or replaces a cell.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(n, _)| *n == name) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((name, value)),
        }
    }

    /// Removes a cell, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.cells.iter().position(|(n, _)| n == name)?;
        Some(self.cells.remove(pos).1)
    }

    /// Returns the value of a column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns true if the column is present.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates cells in order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The entity reference in the `id` column, if any.
    pub fn id(&self) -> Option<&EntityRef> {
        self.get(ID_COLUMN).and_then(Value::as_ref_id)
    }

    /// The navigation token, if the row can be expanded.
    ///
    /// Both string and URI cells are accepted.
    pub fn nav_id(&self) -> Option<&str> {
        match self.get(NAV_ID_COLUMN)? {
            Value::Str(s) | Value::Uri(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Display text for the row.
    ///
    /// Resolution order: `dis`, `navName`, the display text attached to the
    /// `id` ref, the bare id, then [`PLACEHOLDER_DIS`].
    pub fn dis(&self) -> String {
        if let Some(Value::Str(s)) = self.get("dis") {
            return s.clone();
        }
        if let Some(Value::Str(s)) = self.get("navName") {
            return s.clone();
        }
        if let Some(Value::Ref { id, dis }) = self.get(ID_COLUMN) {
            return match dis {
                Some(dis) => dis.clone(),
                None => id.as_str().to_string(),
            };
        }
        PLACEHOLDER_DIS.to_string()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.set(name, value);
        }
        row
    }
}

/// A two-dimensional result: ordered columns and rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Grid {
    /// Creates an empty grid.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a grid whose columns are the ordered union of the rows' columns.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for (name, _) in row.cells() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }
        Self { columns, rows }
    }

    /// Appends a row, extending the column set as needed.
    pub fn push(&mut self, row: Row) {
        for (name, _) in row.cells() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.rows.push(row);
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns a row by index.
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Consumes the grid, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the grid has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut row = Row::new().with("a", 1.0).with("b", 2.0);
        row.set("a", 5.0);
        let names: Vec<_> = row.cells().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::number(5.0)));
    }

    #[test]
    fn dis_resolution() {
        let row = Row::new().with("dis", "Boiler").with("navName", "b1");
        assert_eq!(row.dis(), "Boiler");

        let row = Row::new().with("navName", "b1");
        assert_eq!(row.dis(), "b1");

        let row = Row::new().with(
            ID_COLUMN,
            Value::Ref {
                id: EntityRef::new("p1"),
                dis: Some("Zone Temp".into()),
            },
        );
        assert_eq!(row.dis(), "Zone Temp");

        let row = Row::new().with(ID_COLUMN, EntityRef::new("p1"));
        assert_eq!(row.dis(), "p1");

        assert_eq!(Row::new().with("curVal", 1.0).dis(), PLACEHOLDER_DIS);
    }

    #[test]
    fn nav_id_accepts_uri_and_str() {
        let row = Row::new().with(NAV_ID_COLUMN, Value::Uri("sites/1".into()));
        assert_eq!(row.nav_id(), Some("sites/1"));
        let row = Row::new().with(NAV_ID_COLUMN, "sites/2");
        assert_eq!(row.nav_id(), Some("sites/2"));
        let row = Row::new().with(NAV_ID_COLUMN, "");
        assert_eq!(row.nav_id(), None);
    }

    #[test]
    fn grid_column_union() {
        let grid = Grid::from_rows(vec![
            Row::new().with("a", 1.0),
            Row::new().with("b", 2.0).with("a", 3.0),
        ]);
        assert_eq!(grid.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(grid.len(), 2);
        assert!(Grid::empty().is_empty());
    }
}
