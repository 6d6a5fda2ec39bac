//! Schema inference from spreadsheet rows
//!
//! The backend converts each sheet into an array of JSON objects keyed by
//! header. Inference walks every row once, merging per-column types.

use crate::schema::{Column, ColumnType, SheetSchema};
use chrono::{DateTime, NaiveDate};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Infer the type of a single cell
#[must_use]
pub fn infer_column_type(value: &Value) -> ColumnType {
    match value {
        Value::Null => ColumnType::Empty,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
        Value::Number(_) => ColumnType::Number,
        Value::String(s) => infer_text(s),
        Value::Array(_) | Value::Object(_) => ColumnType::Mixed,
    }
}

fn infer_text(s: &str) -> ColumnType {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return ColumnType::Empty;
    }
    if DateTime::parse_from_rfc3339(trimmed).is_ok()
        || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
    {
        return ColumnType::Date;
    }
    ColumnType::Text
}

/// Build a sheet schema from converted rows
///
/// Columns keep the order in which they first appear. A column missing
/// from some row, or holding null/blank there, is marked nullable.
#[must_use]
pub fn infer_sheet_schema(
    name: impl Into<String>,
    rows: &[Map<String, Value>],
    sample_size: usize,
) -> SheetSchema {
    let mut columns: IndexMap<String, Column> = IndexMap::new();

    for (index, row) in rows.iter().enumerate() {
        for (key, value) in row {
            let cell = infer_column_type(value);
            let column = columns.entry(key.clone()).or_insert_with(|| {
                let mut column = Column::new(key.clone(), ColumnType::Empty);
                // Absent from every earlier row
                column.nullable = index > 0;
                column
            });
            if cell == ColumnType::Empty {
                column.nullable = true;
            }
            column.column_type = column.column_type.merge(cell);
        }
        for column in columns.values_mut() {
            if !row.contains_key(&column.name) {
                column.nullable = true;
            }
        }
    }

    SheetSchema {
        name: name.into(),
        columns: columns.into_values().collect(),
        sample_rows: rows.iter().take(sample_size).cloned().collect(),
        row_count: rows.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn infers_cell_types() {
        assert_eq!(infer_column_type(&json!(3)), ColumnType::Integer);
        assert_eq!(infer_column_type(&json!(3.5)), ColumnType::Number);
        assert_eq!(infer_column_type(&json!(true)), ColumnType::Boolean);
        assert_eq!(infer_column_type(&json!("2024-03-01")), ColumnType::Date);
        assert_eq!(
            infer_column_type(&json!("2024-03-01T10:00:00Z")),
            ColumnType::Date
        );
        assert_eq!(infer_column_type(&json!("north")), ColumnType::Text);
        assert_eq!(infer_column_type(&json!("  ")), ColumnType::Empty);
        assert_eq!(infer_column_type(&Value::Null), ColumnType::Empty);
    }

    #[test]
    fn infers_sheet_schema_in_column_order() {
        let data = rows(json!([
            { "region": "EU", "units": 4, "price": 9.5, "shipped": "2024-01-02" },
            { "region": "US", "units": 7, "price": 10, "shipped": null },
            { "region": "APAC", "units": 1, "price": 3.25, "shipped": "2024-01-09", "note": "rush" }
        ]));

        let sheet = infer_sheet_schema("Sales", &data, 2);

        assert_eq!(sheet.name, "Sales");
        assert_eq!(sheet.row_count, 3);
        assert_eq!(sheet.sample_rows.len(), 2);
        assert_eq!(
            sheet.column_names(),
            vec!["region", "units", "price", "shipped", "note"]
        );
        assert_eq!(sheet.column("region").unwrap().column_type, ColumnType::Text);
        assert_eq!(sheet.column("units").unwrap().column_type, ColumnType::Integer);
        assert_eq!(sheet.column("price").unwrap().column_type, ColumnType::Number);

        let shipped = sheet.column("shipped").unwrap();
        assert_eq!(shipped.column_type, ColumnType::Date);
        assert!(shipped.nullable);

        assert!(sheet.column("note").unwrap().nullable);
        assert!(!sheet.column("region").unwrap().nullable);
    }

    #[test]
    fn conflicting_values_become_mixed() {
        let data = rows(json!([{ "x": 1 }, { "x": "one" }]));
        let sheet = infer_sheet_schema("S", &data, 10);

        assert_eq!(sheet.columns[0].column_type, ColumnType::Mixed);
    }

    #[test]
    fn missing_in_later_row_is_nullable() {
        let data = rows(json!([{ "a": 1, "b": 2 }, { "a": 3 }]));
        let sheet = infer_sheet_schema("S", &data, 10);

        assert!(!sheet.column("a").unwrap().nullable);
        assert!(sheet.column("b").unwrap().nullable);
    }

    #[test]
    fn empty_input_gives_empty_schema() {
        let sheet = infer_sheet_schema("S", &[], 5);
        assert!(sheet.columns.is_empty());
        assert_eq!(sheet.row_count, 0);
    }
}
