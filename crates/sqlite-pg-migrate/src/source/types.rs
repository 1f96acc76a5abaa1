//! Raw source rows addressed by column name.

use std::sync::Arc;

/// A single SQLite value, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Short type label for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "NULL",
            RawValue::Integer(_) => "INTEGER",
            RawValue::Real(_) => "REAL",
            RawValue::Text(_) => "TEXT",
            RawValue::Blob(_) => "BLOB",
        }
    }
}

impl From<rusqlite::types::ValueRef<'_>> for RawValue {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => RawValue::Null,
            ValueRef::Integer(i) => RawValue::Integer(i),
            ValueRef::Real(f) => RawValue::Real(f),
            // Text that is not valid UTF-8 keeps its bytes so the mapper can reject it.
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(s) => RawValue::Text(s.to_string()),
                Err(_) => RawValue::Blob(t.to_vec()),
            },
            ValueRef::Blob(b) => RawValue::Blob(b.to_vec()),
        }
    }
}

/// One source row. The column list is shared by every row of a batch.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// SQLite rowid, used as the pagination cursor.
    pub rowid: i64,
    columns: Arc<[String]>,
    values: Vec<RawValue>,
}

impl RawRow {
    pub fn new(rowid: i64, columns: Arc<[String]>, values: Vec<RawValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            rowid,
            columns,
            values,
        }
    }

    /// Column names in source order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of a column, or `None` when the column is absent.
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| &self.values[idx])
    }

    /// Text value of a column; `None` for absent columns and NULLs.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(RawValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A page of rows read from one table.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub rows: Vec<RawRow>,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rowid of the last row, the cursor for the next page.
    pub fn last_rowid(&self) -> Option<i64> {
        self.rows.last().map(|r| r.rowid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RawRow {
        let columns: Arc<[String]> = vec![
            "id".to_string(),
            "file_path".to_string(),
            "rating".to_string(),
        ]
        .into();
        RawRow::new(
            7,
            columns,
            vec![
                RawValue::Text("abc".to_string()),
                RawValue::Null,
                RawValue::Real(8.1),
            ],
        )
    }

    #[test]
    fn test_named_access() {
        let row = row();
        assert_eq!(row.text("id"), Some("abc"));
        assert_eq!(row.get("rating"), Some(&RawValue::Real(8.1)));
        assert!(row.get("file_path").unwrap().is_null());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_invalid_utf8_text_is_not_replaced() {
        let value = RawValue::from(rusqlite::types::ValueRef::Text(b"Ann\xff"));
        assert_eq!(value, RawValue::Blob(b"Ann\xff".to_vec()));

        let value = RawValue::from(rusqlite::types::ValueRef::Text("Anné".as_bytes()));
        assert_eq!(value, RawValue::Text("Anné".to_string()));
    }

    #[test]
    fn test_text_is_none_for_non_text() {
        let row = row();
        assert_eq!(row.text("rating"), None);
        assert_eq!(row.text("file_path"), None);
    }
}
