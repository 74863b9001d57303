use crate::columns::{LogicalField, TITLE_COLUMN};
use crate::config::ReviewConfig;
use crate::due::due_state;
use crate::error::{Result, ReviewError};
use crate::schema::{CellValue, ReviewAnnotation, Row, RowOutcome};
use crate::upload::{ReviewedRow, Upload};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Read;

/// Decodes the JSON rows produced by the sheet parser.
///
/// The payload must be a non-empty array of objects holding scalar values.
/// Column order is taken from the JSON text as written.
pub fn parse_payload(json: &str) -> Result<Vec<Row>> {
    let rows: Vec<Row> = serde_json::from_str(json).map_err(|err| {
        ReviewError::InvalidPayload(diagnose_payload(json).unwrap_or_else(|| err.to_string()))
    })?;
    check_uniform(&rows)?;
    Ok(rows)
}

fn diagnose_payload(json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(json).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => return Some("expected a list of rows, got a single object".into()),
        other => return Some(format!("expected a list of rows, got {}", other)),
    };

    for (idx, item) in items.iter().enumerate() {
        let Value::Object(map) = item else {
            return Some(format!("row {} is not an object", idx));
        };
        if let Some((column, _)) = map.iter().find(|(_, v)| v.is_array() || v.is_object()) {
            return Some(format!("row {} column '{}' holds a nested value", idx, column));
        }
    }
    None
}

/// Decodes a CSV export with a header line. Blank cells become null and fully
/// blank lines are skipped. Cell text is kept as text.
pub fn parse_csv<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Row>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    check_unique_headers(&headers)?;
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, field)| {
                let value = if field.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::text(field)
                };
                (header, value)
            })
            .collect();
        rows.push(row);
    }

    check_uniform(&rows)?;
    Ok(rows)
}

fn check_unique_headers(headers: &csv::StringRecord) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for header in headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(header) {
            return Err(ReviewError::InvalidPayload(format!(
                "column '{}' appears more than once in the header",
                header
            )));
        }
    }
    Ok(())
}

fn check_uniform(rows: &[Row]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Err(ReviewError::InvalidPayload("the file contains no rows".into()));
    };

    for (idx, row) in rows.iter().enumerate() {
        if row.is_empty() {
            return Err(ReviewError::InvalidPayload(format!(
                "row {} has no columns",
                idx
            )));
        }
        if !row.columns().any(|column| first.contains(column)) {
            return Err(ReviewError::InvalidPayload(format!(
                "row {} shares no columns with the header of row 0",
                idx
            )));
        }
    }
    Ok(())
}

/// Brings rows into the shape every upload shares.
///
/// Original columns are kept verbatim and in order. The only change: a row with
/// a relation column but no title column gets an empty `titel` column appended.
pub fn normalize_rows(rows: Vec<Row>) -> Result<Vec<Row>> {
    check_uniform(&rows)?;

    Ok(rows
        .into_iter()
        .map(|mut row| {
            if LogicalField::Relation.resolve(&row).is_some()
                && LogicalField::Title.resolve(&row).is_none()
            {
                row.insert(TITLE_COLUMN, CellValue::text(""));
            }
            row
        })
        .collect())
}

/// Turns parsed rows into a new [`Upload`] with initial review state.
pub struct Ingestor {
    auto_reject_overdue: bool,
}

impl Ingestor {
    pub fn new(config: &ReviewConfig) -> Self {
        Self {
            auto_reject_overdue: config.auto_reject_overdue,
        }
    }

    /// Validates and normalizes the rows and assigns their initial review
    /// state. Nothing is allocated or stored, so a failure here leaves no trace.
    pub fn prepare(&self, rows: Vec<Row>, now: DateTime<Utc>) -> Result<Vec<ReviewedRow>> {
        let rows = normalize_rows(rows)?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| self.initial_review(idx, row, now))
            .collect())
    }

    pub fn ingest(
        &self,
        id: u64,
        filename: &str,
        rows: Vec<Row>,
        now: DateTime<Utc>,
    ) -> Result<Upload> {
        let reviewed = self.prepare(rows, now)?;
        let upload = Upload::new(id, filename, reviewed, now);
        log_ingested(&upload);
        Ok(upload)
    }

    /// Review state a row starts out with.
    ///
    /// A row starts out rejected exactly when its due state is known and
    /// negative. Legacy `Akkoord`/`Afgewezen` columns play no part; they are
    /// only hidden from exports. Internal `_` fields in an uploaded file are
    /// dropped, except for the comment text.
    fn initial_review(&self, idx: usize, row: Row, now: DateTime<Utc>) -> ReviewedRow {
        let ReviewedRow { cells, annotation } = ReviewedRow::from_payload(row);

        let outcome = match due_state(&cells, now) {
            Some(state) if self.auto_reject_overdue && state.is_overdue() => {
                debug!("Row {} is overdue ({}), flagging for rejection", idx, state);
                RowOutcome::Rejected
            }
            _ => RowOutcome::Pending,
        };

        ReviewedRow {
            cells,
            annotation: ReviewAnnotation {
                outcome,
                comments: annotation.comments,
            },
        }
    }
}

pub(crate) fn log_ingested(upload: &Upload) {
    let summary = upload.summary();
    info!(
        "Ingested upload {} ('{}'): {} rows, {} flagged as overdue",
        upload.id(),
        upload.filename(),
        summary.total,
        summary.rejected
    );
}
