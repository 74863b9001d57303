use crate::columns::{COMMENTS_FIELD, REJECTED_FIELD, STATUS_FIELD};
use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single spreadsheet cell as handed over by the file parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way it should appear in a text document.
    /// Null renders as an empty string, integral numbers without decimals.
    pub fn to_plain_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Interprets spreadsheet-style booleans ("ja", "x", 1, true).
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => matches!(
                s.trim().to_lowercase().as_str(),
                "true" | "ja" | "yes" | "y" | "j" | "x" | "1" | "waar"
            ),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// One line of an uploaded sheet: column name to value, in header order.
///
/// Column order is part of the data. It decides the export column order, so the
/// row keeps insertion order instead of sorting its keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == column)
    }

    /// Replaces the value in place when the column exists, appends otherwise.
    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) -> Option<CellValue> {
        let column = column.into();
        if let Some((_, existing)) = self.cells.iter_mut().find(|(name, _)| *name == column) {
            return Some(std::mem::replace(existing, value));
        }
        self.cells.push((column, value));
        None
    }

    pub fn remove(&mut self, column: &str) -> Option<CellValue> {
        let idx = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &CellValue) -> bool,
    {
        self.cells.retain(|(name, value)| keep(name, value));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object mapping column names to scalar cell values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
        let mut row = Row::new();
        while let Some((column, value)) = access.next_entry::<String, CellValue>()? {
            if row.contains(&column) {
                return Err(de::Error::custom(format!("duplicate column '{}'", column)));
            }
            row.insert(column, value);
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

impl JsonSchema for Row {
    fn schema_name() -> String {
        "Row".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <BTreeMap<String, CellValue>>::json_schema(gen)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    #[default]
    #[schemars(description = "The reviewer has not decided on this line yet. Exported as approved.")]
    Pending,

    #[schemars(description = "The reviewer accepted this invoice line.")]
    Approved,

    #[schemars(
        description = "The reviewer flagged a problem with this invoice line. Overdue lines start out in this state."
    )]
    Rejected,
}

impl RowOutcome {
    pub fn is_rejected(self) -> bool {
        self == RowOutcome::Rejected
    }

    /// Value written to the `_status` payload field.
    pub fn status_code(self) -> &'static str {
        match self {
            RowOutcome::Pending => "pending",
            RowOutcome::Approved => "approved",
            RowOutcome::Rejected => "issue",
        }
    }
}

/// The reviewer's verdict on a single row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewAnnotation {
    pub outcome: RowOutcome,
    #[serde(default)]
    pub comments: String,
}

impl ReviewAnnotation {
    pub fn has_comment(&self) -> bool {
        !self.comments.trim().is_empty()
    }

    /// Reads the internal payload fields of a stored row.
    ///
    /// `_status` takes precedence over the older `_rejected` toggle: `"issue"` is
    /// rejected, `"approved"` is approved. Without either the row is pending.
    pub fn from_payload(row: &Row) -> Self {
        let status = match row.get(STATUS_FIELD) {
            Some(CellValue::Text(s)) => match s.trim().to_lowercase().as_str() {
                "issue" | "rejected" => Some(RowOutcome::Rejected),
                "approved" => Some(RowOutcome::Approved),
                _ => None,
            },
            _ => None,
        };

        let outcome = status.unwrap_or_else(|| match row.get(REJECTED_FIELD) {
            Some(value) if value.is_truthy() => RowOutcome::Rejected,
            _ => RowOutcome::Pending,
        });

        let comments = row
            .get(COMMENTS_FIELD)
            .map(CellValue::to_plain_string)
            .unwrap_or_default();

        Self { outcome, comments }
    }

    /// Writes all internal fields, each derived from the single outcome.
    pub fn write_payload(&self, row: &mut Row) {
        row.insert(STATUS_FIELD, CellValue::text(self.outcome.status_code()));
        row.insert(COMMENTS_FIELD, CellValue::text(self.comments.clone()));
        row.insert(REJECTED_FIELD, CellValue::Bool(self.outcome.is_rejected()));
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Reviewed,
    Processed,
}

/// Storage form of an upload, handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadRecord {
    pub id: u64,

    #[schemars(description = "Original file name as uploaded")]
    pub filename: String,

    #[schemars(
        description = "Rows in upload order. Original columns are kept verbatim; review state is stored in the _status, _comments and _rejected fields."
    )]
    pub rows: Vec<Row>,

    #[serde(default)]
    pub overall_comments: String,

    pub status: UploadStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(UploadRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RowDecision {
    #[schemars(description = "Zero-based index of the row in upload order")]
    pub row: usize,

    pub outcome: RowOutcome,

    #[serde(default)]
    #[schemars(description = "Replacement comment text. Omit to keep the current comment.")]
    pub comments: Option<String>,
}

/// The reviewer's whole batch of edits, submitted at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReviewSubmission {
    #[serde(default)]
    #[schemars(description = "General reviewer remarks. Each line becomes its own line in the export.")]
    pub overall_comments: String,

    #[serde(default)]
    pub decisions: Vec<RowDecision>,
}

impl ReviewSubmission {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReviewSubmission)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_keeps_column_order_through_json() {
        let json = r#"{"Relatie":"Acme","Bedrag":12.5,"Factuurdatum":"2024-01-01","Akkoord":null}"#;
        let row: Row = serde_json::from_str(json).unwrap();

        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["Relatie", "Bedrag", "Factuurdatum", "Akkoord"]);
        assert_eq!(row.get("Bedrag"), Some(&CellValue::Number(12.5)));
        assert_eq!(row.get("Akkoord"), Some(&CellValue::Null));

        assert_eq!(serde_json::to_string(&row).unwrap(), json);
    }

    #[test]
    fn test_row_insert_replaces_in_place() {
        let mut row: Row = vec![("a", CellValue::from("1")), ("b", CellValue::from("2"))]
            .into_iter()
            .collect();
        row.insert("a", CellValue::from("3"));

        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&CellValue::from("3")));
    }

    #[test]
    fn test_row_rejects_nested_values() {
        let result: Result<Row, _> = serde_json::from_str(r#"{"a":[1,2]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_plain_string_rendering() {
        assert_eq!(CellValue::Null.to_plain_string(), "");
        assert_eq!(CellValue::Number(30.0).to_plain_string(), "30");
        assert_eq!(CellValue::Number(12.5).to_plain_string(), "12.5");
        assert_eq!(CellValue::Bool(true).to_plain_string(), "true");
    }

    #[test]
    fn test_annotation_status_wins_over_rejected_flag() {
        let mut row = Row::new();
        row.insert(STATUS_FIELD, CellValue::from("approved"));
        row.insert(REJECTED_FIELD, CellValue::Bool(true));
        assert_eq!(ReviewAnnotation::from_payload(&row).outcome, RowOutcome::Approved);

        let mut row = Row::new();
        row.insert(REJECTED_FIELD, CellValue::Bool(true));
        row.insert(COMMENTS_FIELD, CellValue::from("dubbel gefactureerd"));
        let annotation = ReviewAnnotation::from_payload(&row);
        assert_eq!(annotation.outcome, RowOutcome::Rejected);
        assert_eq!(annotation.comments, "dubbel gefactureerd");

        assert_eq!(
            ReviewAnnotation::from_payload(&Row::new()).outcome,
            RowOutcome::Pending
        );
    }

    #[test]
    fn test_annotation_payload_fields_agree() {
        let annotation = ReviewAnnotation {
            outcome: RowOutcome::Rejected,
            comments: "bedrag klopt niet".to_string(),
        };
        let mut row = Row::new();
        annotation.write_payload(&mut row);

        assert_eq!(row.get(STATUS_FIELD), Some(&CellValue::from("issue")));
        assert_eq!(row.get(REJECTED_FIELD), Some(&CellValue::Bool(true)));
        assert_eq!(ReviewAnnotation::from_payload(&row), annotation);
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = UploadRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("filename"));
        assert!(schema_json.contains("overall_comments"));

        let submission_schema = ReviewSubmission::schema_as_json().unwrap();
        assert!(submission_schema.contains("decisions"));
        assert!(submission_schema.contains("rejected"));
    }
}
