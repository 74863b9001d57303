use crate::columns::is_internal_column;
use crate::due::{due_state, DueState};
use crate::error::{Result, ReviewError};
use crate::schema::{ReviewAnnotation, Row, RowOutcome, UploadRecord, UploadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

impl UploadStatus {
    /// Reviews may be redone until the upload is processed. Processing
    /// requires a review.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Uploaded, UploadStatus::Reviewed)
                | (UploadStatus::Reviewed, UploadStatus::Reviewed)
                | (UploadStatus::Reviewed, UploadStatus::Processed)
        )
    }
}

/// An uploaded row together with its review state. `cells` never holds
/// internal fields; they only exist in the payload form.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedRow {
    pub cells: Row,
    pub annotation: ReviewAnnotation,
}

impl ReviewedRow {
    pub fn new(cells: Row) -> Self {
        Self {
            cells,
            annotation: ReviewAnnotation::default(),
        }
    }

    /// Splits a stored payload row into original cells and annotation.
    pub fn from_payload(mut row: Row) -> Self {
        let annotation = ReviewAnnotation::from_payload(&row);
        row.retain(|column, _| !is_internal_column(column));
        Self {
            cells: row,
            annotation,
        }
    }

    pub fn to_payload(&self) -> Row {
        let mut row = self.cells.clone();
        self.annotation.write_payload(&mut row);
        row
    }

    pub fn outcome(&self) -> RowOutcome {
        self.annotation.outcome
    }

    pub fn due_state(&self, now: DateTime<Utc>) -> Option<DueState> {
        due_state(&self.cells, now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
    pub commented: usize,
}

impl ReviewSummary {
    pub fn from_rows(rows: &[ReviewedRow]) -> Self {
        let mut summary = ReviewSummary {
            total: rows.len(),
            ..Default::default()
        };
        for row in rows {
            match row.outcome() {
                RowOutcome::Approved => summary.approved += 1,
                RowOutcome::Rejected => summary.rejected += 1,
                RowOutcome::Pending => summary.pending += 1,
            }
            if row.annotation.has_comment() {
                summary.commented += 1;
            }
        }
        summary
    }
}

/// One ingested file and its review state.
#[derive(Debug, Clone)]
pub struct Upload {
    id: u64,
    filename: String,
    rows: Vec<ReviewedRow>,
    overall_comments: String,
    status: UploadStatus,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl Upload {
    pub fn new(
        id: u64,
        filename: impl Into<String>,
        rows: Vec<ReviewedRow>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            rows,
            overall_comments: String::new(),
            status: UploadStatus::Uploaded,
            created_at,
            reviewed_at: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn rows(&self) -> &[ReviewedRow] {
        &self.rows
    }

    pub fn overall_comments(&self) -> &str {
        &self.overall_comments
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn summary(&self) -> ReviewSummary {
        ReviewSummary::from_rows(&self.rows)
    }

    /// Replaces the whole row set with the reviewed one.
    ///
    /// Either every field changes or none does: the transition and row count
    /// are checked before anything is written.
    pub fn record_review(
        &mut self,
        rows: Vec<ReviewedRow>,
        overall_comments: String,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_transition(UploadStatus::Reviewed)?;

        if rows.len() != self.rows.len() {
            return Err(ReviewError::InvalidPayload(format!(
                "Review holds {} rows but upload {} has {}",
                rows.len(),
                self.id,
                self.rows.len()
            )));
        }

        self.rows = rows;
        self.overall_comments = overall_comments;
        self.status = UploadStatus::Reviewed;
        self.reviewed_at = Some(at);
        Ok(())
    }

    pub fn mark_processed(&mut self) -> Result<()> {
        self.check_transition(UploadStatus::Processed)?;
        self.status = UploadStatus::Processed;
        Ok(())
    }

    fn check_transition(&self, to: UploadStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(ReviewError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    pub fn to_record(&self) -> UploadRecord {
        UploadRecord {
            id: self.id,
            filename: self.filename.clone(),
            rows: self.rows.iter().map(ReviewedRow::to_payload).collect(),
            overall_comments: self.overall_comments.clone(),
            status: self.status,
            created_at: self.created_at,
            reviewed_at: self.reviewed_at,
        }
    }

    pub fn from_record(record: UploadRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            rows: record
                .rows
                .into_iter()
                .map(ReviewedRow::from_payload)
                .collect(),
            overall_comments: record.overall_comments,
            status: record.status,
            created_at: record.created_at,
            reviewed_at: record.reviewed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{COMMENTS_FIELD, REJECTED_FIELD, STATUS_FIELD};
    use crate::schema::CellValue;
    use chrono::TimeZone;

    fn sample_upload() -> Upload {
        let rows = (1..=3)
            .map(|n| {
                let cells: Row = vec![
                    ("Debiteurnummer", CellValue::from(n.to_string())),
                    ("Bedrag", CellValue::Number(n as f64 * 100.0)),
                ]
                .into_iter()
                .collect();
                ReviewedRow::new(cells)
            })
            .collect();
        Upload::new(
            7,
            "debiteuren.xlsx",
            rows,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_payload_split_strips_internal_fields() {
        let mut row = Row::new();
        row.insert("Relatie", CellValue::from("Acme"));
        row.insert(STATUS_FIELD, CellValue::from("issue"));
        row.insert(COMMENTS_FIELD, CellValue::from("te laat"));
        row.insert(REJECTED_FIELD, CellValue::Bool(true));

        let reviewed = ReviewedRow::from_payload(row);
        let columns: Vec<&str> = reviewed.cells.columns().collect();
        assert_eq!(columns, vec!["Relatie"]);
        assert_eq!(reviewed.outcome(), RowOutcome::Rejected);

        let payload = reviewed.to_payload();
        let columns: Vec<&str> = payload.columns().collect();
        assert_eq!(columns, vec!["Relatie", "_status", "_comments", "_rejected"]);
    }

    #[test]
    fn test_record_review_transitions() {
        let mut upload = sample_upload();
        let mut rows = upload.rows().to_vec();
        rows[1].annotation.outcome = RowOutcome::Rejected;

        let at = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        upload
            .record_review(rows.clone(), "Controleer regel 2".to_string(), at)
            .unwrap();
        assert_eq!(upload.status(), UploadStatus::Reviewed);
        assert_eq!(upload.reviewed_at(), Some(at));
        assert_eq!(upload.summary().rejected, 1);

        // A second review replaces the first.
        upload.record_review(rows, String::new(), at).unwrap();
        assert_eq!(upload.overall_comments(), "");

        upload.mark_processed().unwrap();
        let err = upload
            .record_review(upload.rows().to_vec(), String::new(), at)
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidTransition { .. }));
    }

    #[test]
    fn test_record_review_is_atomic() {
        let mut upload = sample_upload();
        let before = upload.to_record();

        let short = upload.rows()[..2].to_vec();
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        let err = upload
            .record_review(short, "mag niet".to_string(), at)
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidPayload(_)));

        assert_eq!(upload.status(), UploadStatus::Uploaded);
        assert_eq!(upload.overall_comments(), "");
        assert_eq!(upload.rows().len(), before.rows.len());
        assert_eq!(upload.reviewed_at(), None);
    }

    #[test]
    fn test_processing_requires_review() {
        let mut upload = sample_upload();
        assert!(upload.mark_processed().is_err());
    }

    #[test]
    fn test_record_round_trip_through_json() {
        let mut upload = sample_upload();
        let mut rows = upload.rows().to_vec();
        rows[0].annotation = ReviewAnnotation {
            outcome: RowOutcome::Approved,
            comments: "ok".to_string(),
        };
        upload
            .record_review(
                rows,
                "Alles nagekeken".to_string(),
                Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap(),
            )
            .unwrap();

        let json = serde_json::to_string(&upload.to_record()).unwrap();
        let restored = Upload::from_record(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.rows(), upload.rows());
        assert_eq!(restored.status(), UploadStatus::Reviewed);
        assert_eq!(restored.overall_comments(), "Alles nagekeken");
    }
}
