//! Employee records and the batch they belong to.

use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// Value used for any missing or empty cell.
pub const MISSING: &str = "N/A";

/// Well-known roster columns.
pub mod fields {
    pub const NAME: &str = "Name";
    pub const EMP_CODE: &str = "Emp Code";
    pub const AREA: &str = "Area";
    pub const LOCATION: &str = "Location-Delhi";
    pub const PICKUP_TIME: &str = "Pickup Time";
    pub const CONTACT_NO: &str = "Contact No.";
    pub const PROCESS: &str = "Process";
    pub const EMAIL: &str = "Email";
}

/// One roster row: column name → cell value, in column order.
///
/// All records of a batch share the same column schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl EmployeeRecord {
    /// `values` must have exactly one entry per column.
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Raw lookup; `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Lookup that falls back to `"N/A"` for unknown columns.
    pub fn field(&self, column: &str) -> &str {
        self.get(column).unwrap_or(MISSING)
    }

    /// Recipient address as written in the sheet, surrounding whitespace trimmed.
    pub fn email(&self) -> &str {
        self.field(fields::EMAIL).trim()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

impl Serialize for EmployeeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// All records parsed from one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    columns: Arc<[String]>,
    records: Vec<EmployeeRecord>,
}

impl Batch {
    /// Build a batch from a header and rows. Rows are padded with `"N/A"` or
    /// cut to the header width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let width = columns.len();
        let records = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, MISSING.to_string());
                EmployeeRecord::new(Arc::clone(&columns), row)
            })
            .collect();
        Self { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[EmployeeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for Batch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Batch", 3)?;
        state.serialize_field("columns", &*self.columns)?;
        state.serialize_field("row_count", &self.records.len())?;
        state.serialize_field("records", &self.records)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Batch {
        Batch::from_rows(
            vec!["Name".into(), "Email".into(), "Area".into()],
            vec![
                vec!["Asha".into(), " asha@example.com ".into(), "North".into()],
                vec!["Ravi".into(), "N/A".into()],
            ],
        )
    }

    #[test]
    fn lookup_by_column() {
        let batch = sample();
        let first = &batch.records()[0];
        assert_eq!(first.get("Name"), Some("Asha"));
        assert_eq!(first.get("Pickup Time"), None);
        assert_eq!(first.field("Pickup Time"), "N/A");
        assert_eq!(first.email(), "asha@example.com");
    }

    #[test]
    fn short_rows_are_padded() {
        let batch = sample();
        let second = &batch.records()[1];
        assert_eq!(second.values().len(), 3);
        assert_eq!(second.field("Area"), "N/A");
    }

    #[test]
    fn records_share_schema() {
        let batch = sample();
        assert_eq!(batch.len(), 2);
        assert!(
            batch
                .records()
                .iter()
                .all(|r| r.columns() == batch.columns())
        );
    }

    #[test]
    fn serializes_in_column_order() {
        let batch = Batch::from_rows(
            vec!["Zeta".into(), "Alpha".into()],
            vec![vec!["z".into(), "a".into()]],
        );
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(
            json,
            r#"{"columns":["Zeta","Alpha"],"row_count":1,"records":[{"Zeta":"z","Alpha":"a"}]}"#
        );
    }
}
