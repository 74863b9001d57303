//! # Invoice Review
//!
//! Reconciliation engine behind an invoice review portal: uploaders submit
//! spreadsheets of invoice lines, a reviewer approves or rejects each line, and
//! the reviewed result is exported for spreadsheet or PDF writers.
//!
//! ## Core Concepts
//!
//! - **Rows**: Sheet lines keyed by whatever column names the bookkeeping package used
//! - **Column aliases**: One logical field (invoice date, payment term, debtor number) maps to several literal names
//! - **Due state**: Days until an invoice is due, from invoice date + payment term or a "days open" column
//! - **Review outcome**: One tri-state verdict per row (pending, approved, rejected) plus a free-text comment
//! - **Export projection**: Original columns minus bookkeeping fields, plus status and comments, sorted by debtor
//!
//! ## Example
//!
//! ```rust,ignore
//! use invoice_review::*;
//! use chrono::Utc;
//!
//! let rows = parse_payload(r#"[
//!     {"Debiteurnummer": "10", "Factuurdatum": "2024-01-01", "Betalingstermijn": "30", "Bedrag": 250.0},
//!     {"Debiteurnummer": "9", "Factuurdatum": "2024-02-25", "Betalingstermijn": "30", "Bedrag": 80.0}
//! ]"#).unwrap();
//!
//! let config = ReviewConfig::default();
//! let upload = ingest_upload(&config, 1, "maart.xlsx", rows, Utc::now()).unwrap();
//!
//! let mut session = ReviewSession::open(upload).unwrap();
//! session.approve(1).unwrap();
//! session.reject(0, Some("Al betaald")).unwrap();
//! let reviewed = session.submit(Utc::now()).unwrap().upload;
//!
//! let csv = export_upload(&config, &reviewed).to_csv(b';').unwrap();
//! ```

pub mod columns;
pub mod config;
pub mod due;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod notify;
pub mod review;
pub mod schema;
pub mod service;
pub mod upload;
pub mod utils;

pub use columns::{is_currency_column, is_exportable_column, LogicalField};
pub use config::{ExportOptions, NotificationSettings, ReviewConfig};
pub use due::{days_remaining, due_state, is_overdue, DueSource, DueState};
pub use error::{Result, ReviewError};
pub use export::{status_label, ExportCell, ExportProjector, ExportTable};
pub use ingestion::*;
pub use notify::{
    dispatch, DispatchReport, NotificationAction, NotificationEvent, NotificationPlanner,
    NotificationSink,
};
pub use review::{ReviewSession, SubmittedReview};
pub use schema::*;
pub use service::{InMemoryUploadStore, ReviewService, UploadStore};
pub use upload::{ReviewSummary, ReviewedRow, Upload};
pub use utils::{format_currency, natural_cmp};

use chrono::{DateTime, Utc};
use log::{debug, info};

pub struct InvoiceReviewProcessor;

impl InvoiceReviewProcessor {
    pub fn ingest(
        config: &ReviewConfig,
        id: u64,
        filename: &str,
        rows: Vec<Row>,
        now: DateTime<Utc>,
    ) -> Result<Upload> {
        config.validate()?;
        debug!(
            "Ingesting {} rows from '{}' (auto-reject overdue: {})",
            rows.len(),
            filename,
            config.auto_reject_overdue
        );
        Ingestor::new(config).ingest(id, filename, rows, now)
    }

    pub fn ingest_json(
        config: &ReviewConfig,
        id: u64,
        filename: &str,
        json: &str,
        now: DateTime<Utc>,
    ) -> Result<Upload> {
        let rows = parse_payload(json)?;
        Self::ingest(config, id, filename, rows, now)
    }

    pub fn export(config: &ReviewConfig, upload: &Upload) -> ExportTable {
        info!(
            "Exporting upload {} ('{}') in status {:?}",
            upload.id(),
            upload.filename(),
            upload.status()
        );
        ExportProjector::new(&config.export).project_upload(upload)
    }
}

pub fn ingest_upload(
    config: &ReviewConfig,
    id: u64,
    filename: &str,
    rows: Vec<Row>,
    now: DateTime<Utc>,
) -> Result<Upload> {
    InvoiceReviewProcessor::ingest(config, id, filename, rows, now)
}

pub fn export_upload(config: &ReviewConfig, upload: &Upload) -> ExportTable {
    InvoiceReviewProcessor::export(config, upload)
}
