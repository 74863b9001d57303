use crate::error::{Result, ReviewError};
use crate::export::{ExportProjector, ExportTable};
use crate::schema::{ReviewSubmission, RowOutcome, UploadStatus};
use crate::upload::{ReviewedRow, ReviewSummary, Upload};
use chrono::{DateTime, Utc};
use log::{debug, info};

/// A reviewer's working copy of one upload.
///
/// The session owns the upload for as long as the review runs. Edits only touch
/// the working rows; the upload itself changes once, in [`ReviewSession::submit`].
#[derive(Debug)]
pub struct ReviewSession {
    upload: Upload,
    working: Vec<ReviewedRow>,
    overall_comments: String,
}

/// Result of a committed review.
#[derive(Debug)]
pub struct SubmittedReview {
    pub upload: Upload,
    /// Rows as they were when the session opened.
    pub previous: Vec<ReviewedRow>,
}

impl ReviewSession {
    pub fn open(upload: Upload) -> Result<Self> {
        if !upload.status().can_transition_to(UploadStatus::Reviewed) {
            return Err(ReviewError::InvalidTransition {
                from: upload.status(),
                to: UploadStatus::Reviewed,
            });
        }

        debug!("Opened review session for upload {}", upload.id());
        Ok(Self {
            working: upload.rows().to_vec(),
            overall_comments: upload.overall_comments().to_string(),
            upload,
        })
    }

    pub fn upload(&self) -> &Upload {
        &self.upload
    }

    pub fn rows(&self) -> &[ReviewedRow] {
        &self.working
    }

    pub fn overall_comments(&self) -> &str {
        &self.overall_comments
    }

    pub fn summary(&self) -> ReviewSummary {
        ReviewSummary::from_rows(&self.working)
    }

    pub fn approve(&mut self, row: usize) -> Result<()> {
        self.row_mut(row)?.annotation.outcome = RowOutcome::Approved;
        Ok(())
    }

    /// Rejects a row, optionally replacing its comment in the same step.
    pub fn reject(&mut self, row: usize, comment: Option<&str>) -> Result<()> {
        let target = self.row_mut(row)?;
        target.annotation.outcome = RowOutcome::Rejected;
        if let Some(comment) = comment {
            target.annotation.comments = comment.to_string();
        }
        Ok(())
    }

    pub fn reset(&mut self, row: usize) -> Result<()> {
        self.row_mut(row)?.annotation.outcome = RowOutcome::Pending;
        Ok(())
    }

    pub fn comment(&mut self, row: usize, text: &str) -> Result<()> {
        self.row_mut(row)?.annotation.comments = text.to_string();
        Ok(())
    }

    pub fn set_overall_comments(&mut self, text: impl Into<String>) {
        self.overall_comments = text.into();
    }

    /// Applies a batch from the review screen. Every row index is checked
    /// before any decision is applied.
    pub fn apply(&mut self, submission: &ReviewSubmission) -> Result<()> {
        let len = self.working.len();
        if let Some(bad) = submission.decisions.iter().find(|d| d.row >= len) {
            return Err(ReviewError::RowOutOfRange { row: bad.row, len });
        }

        for decision in &submission.decisions {
            let row = &mut self.working[decision.row];
            row.annotation.outcome = decision.outcome;
            if let Some(comments) = &decision.comments {
                row.annotation.comments = comments.clone();
            }
        }
        self.overall_comments = submission.overall_comments.clone();
        Ok(())
    }

    /// What the export would look like if the review were submitted now.
    pub fn preview(&self, projector: &ExportProjector) -> ExportTable {
        projector.project(&self.working, &self.overall_comments)
    }

    /// Commits the working rows to the upload in one step.
    pub fn submit(self, at: DateTime<Utc>) -> Result<SubmittedReview> {
        let ReviewSession {
            mut upload,
            working,
            overall_comments,
        } = self;

        let previous = upload.rows().to_vec();
        upload.record_review(working, overall_comments, at)?;

        let summary = upload.summary();
        info!(
            "Review of upload {} submitted: {} approved, {} rejected, {} pending",
            upload.id(),
            summary.approved,
            summary.rejected,
            summary.pending
        );

        Ok(SubmittedReview { upload, previous })
    }

    fn row_mut(&mut self, row: usize) -> Result<&mut ReviewedRow> {
        let len = self.working.len();
        self.working
            .get_mut(row)
            .ok_or(ReviewError::RowOutOfRange { row, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CellValue, Row, RowDecision};
    use chrono::TimeZone;

    fn upload() -> Upload {
        let rows = ["12", "3", "7"]
            .iter()
            .map(|debtor| {
                let cells: Row = vec![
                    ("Debiteurnummer", CellValue::from(*debtor)),
                    ("Openstaand bedrag", CellValue::Number(99.0)),
                ]
                .into_iter()
                .collect();
                ReviewedRow::new(cells)
            })
            .collect();
        Upload::new(11, "mei.csv", rows, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_edits_stay_in_session_until_submit() {
        let mut session = ReviewSession::open(upload()).unwrap();
        session.approve(0).unwrap();
        session.reject(1, Some("geen order gevonden")).unwrap();
        session.comment(2, "navragen").unwrap();

        assert_eq!(session.upload().summary().pending, 3);
        assert_eq!(session.summary().approved, 1);

        let submitted = session.submit(at()).unwrap();
        let upload = submitted.upload;
        assert_eq!(upload.status(), UploadStatus::Reviewed);
        assert_eq!(upload.rows()[1].outcome(), RowOutcome::Rejected);
        assert_eq!(upload.rows()[1].annotation.comments, "geen order gevonden");
        assert_eq!(upload.rows()[2].annotation.comments, "navragen");
        assert_eq!(upload.rows()[2].outcome(), RowOutcome::Pending);
        assert!(submitted.previous.iter().all(|r| r.outcome() == RowOutcome::Pending));
    }

    #[test]
    fn test_reject_then_approve_clears_rejection() {
        let mut session = ReviewSession::open(upload()).unwrap();
        session.reject(0, None).unwrap();
        session.approve(0).unwrap();
        assert_eq!(session.rows()[0].outcome(), RowOutcome::Approved);
        session.reset(0).unwrap();
        assert_eq!(session.rows()[0].outcome(), RowOutcome::Pending);
    }

    #[test]
    fn test_out_of_range_edit() {
        let mut session = ReviewSession::open(upload()).unwrap();
        let err = session.approve(3).unwrap_err();
        assert!(matches!(err, ReviewError::RowOutOfRange { row: 3, len: 3 }));
    }

    #[test]
    fn test_apply_submission_is_all_or_nothing() {
        let mut session = ReviewSession::open(upload()).unwrap();
        let submission = ReviewSubmission {
            overall_comments: "Nieuwe opmerkingen".to_string(),
            decisions: vec![
                RowDecision {
                    row: 0,
                    outcome: RowOutcome::Rejected,
                    comments: Some("dubbel".to_string()),
                },
                RowDecision {
                    row: 9,
                    outcome: RowOutcome::Approved,
                    comments: None,
                },
            ],
        };

        assert!(session.apply(&submission).is_err());
        assert_eq!(session.rows()[0].outcome(), RowOutcome::Pending);
        assert_eq!(session.overall_comments(), "");
    }

    #[test]
    fn test_apply_submission_from_json() {
        let mut session = ReviewSession::open(upload()).unwrap();
        let submission: ReviewSubmission = serde_json::from_str(
            r#"{"overall_comments":"Akkoord op twee regels",
                "decisions":[{"row":0,"outcome":"approved"},
                             {"row":1,"outcome":"rejected","comments":"btw fout"}]}"#,
        )
        .unwrap();
        session.apply(&submission).unwrap();

        let summary = session.summary();
        assert_eq!((summary.approved, summary.rejected, summary.pending), (1, 1, 1));
        assert_eq!(summary.commented, 1);
        assert_eq!(session.overall_comments(), "Akkoord op twee regels");
    }

    #[test]
    fn test_preview_matches_submitted_export() {
        let mut session = ReviewSession::open(upload()).unwrap();
        session.reject(2, Some("te laat")).unwrap();
        session.set_overall_comments("Controle mei");

        let projector = ExportProjector::default();
        let preview = session.preview(&projector);
        let submitted = session.submit(at()).unwrap();

        assert_eq!(preview, projector.project_upload(&submitted.upload));
    }

    #[test]
    fn test_processed_upload_cannot_be_reviewed() {
        let session = ReviewSession::open(upload()).unwrap();
        let mut upload = session.submit(at()).unwrap().upload;
        upload.mark_processed().unwrap();

        let err = ReviewSession::open(upload).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidTransition {
                from: UploadStatus::Processed,
                to: UploadStatus::Reviewed
            }
        ));
    }
}
