//! Tabular schema model
//!
//! A node's output is described per sheet: column names, inferred column
//! types and a handful of sample rows. Downstream nodes use it to populate
//! their column pickers.

use serde::{Deserialize, Serialize};

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// No non-null value seen yet
    Empty,
    Boolean,
    Integer,
    Number,
    Date,
    Text,
    /// Values of incompatible types
    Mixed,
}

impl ColumnType {
    /// Combine the type seen so far with the type of another value
    #[must_use]
    pub fn merge(self, other: ColumnType) -> ColumnType {
        use ColumnType::{Empty, Integer, Mixed, Number};
        match (self, other) {
            (a, b) if a == b => a,
            (Empty, b) => b,
            (a, Empty) => a,
            (Integer, Number) | (Number, Integer) => Number,
            _ => Mixed,
        }
    }

    /// Whether filter nodes can compare this column numerically
    #[inline]
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Number)
    }
}

/// One column of a sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Schema of one sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSchema {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub sample_rows: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub row_count: usize,
}

impl SheetSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            sample_rows: Vec::new(),
            row_count: 0,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Schema of a node's output, one entry per sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    #[serde(default)]
    pub sheets: Vec<SheetSchema>,
}

impl NodeSchema {
    #[must_use]
    pub fn new(sheets: Vec<SheetSchema>) -> Self {
        Self { sheets }
    }

    /// Single-sheet schema
    #[must_use]
    pub fn single(sheet: SheetSchema) -> Self {
        Self {
            sheets: vec![sheet],
        }
    }

    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&SheetSchema> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// First sheet, used when an edge names none
    #[must_use]
    pub fn default_sheet(&self) -> Option<&SheetSchema> {
        self.sheets.first()
    }

    /// Named sheet, or the default sheet when `sheet` is `None`
    #[must_use]
    pub fn resolve(&self, sheet: Option<&str>) -> Option<&SheetSchema> {
        match sheet {
            Some(name) => self.sheet(name),
            None => self.default_sheet(),
        }
    }

    /// A schema row counts as populated once any sheet has columns
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.sheets.iter().any(|s| !s.columns.is_empty())
    }

    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Column names of the resolved sheet (empty if it does not exist)
    #[must_use]
    pub fn column_names(&self, sheet: Option<&str>) -> Vec<&str> {
        self.resolve(sheet)
            .map(SheetSchema::column_names)
            .unwrap_or_default()
    }

    /// Keep only the resolved sheet; `None` keeps everything
    #[must_use]
    pub fn restrict(&self, sheet: Option<&str>) -> Option<NodeSchema> {
        match sheet {
            None => Some(self.clone()),
            Some(name) => self.sheet(name).cloned().map(NodeSchema::single),
        }
    }
}
