use crate::config::ReviewConfig;
use crate::error::{Result, ReviewError};
use crate::export::{ExportProjector, ExportTable};
use crate::ingestion::{log_ingested, Ingestor};
use crate::notify::{dispatch, NotificationEvent, NotificationPlanner, NotificationSink};
use crate::review::ReviewSession;
use crate::schema::{Row, UploadRecord};
use crate::upload::Upload;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::BTreeMap;

/// Persistence collaborator. Saving a record replaces the stored one
/// (last write wins).
pub trait UploadStore {
    fn next_id(&mut self) -> Result<u64>;
    fn save(&mut self, record: &UploadRecord) -> Result<()>;
    fn load(&self, id: u64) -> Result<Option<UploadRecord>>;
}

/// Keeps records as serialized JSON, the way a database column would.
#[derive(Debug, Default)]
pub struct InMemoryUploadStore {
    records: BTreeMap<u64, String>,
    last_id: u64,
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl UploadStore for InMemoryUploadStore {
    fn next_id(&mut self) -> Result<u64> {
        self.last_id += 1;
        Ok(self.last_id)
    }

    fn save(&mut self, record: &UploadRecord) -> Result<()> {
        self.records
            .insert(record.id, serde_json::to_string(record)?);
        Ok(())
    }

    fn load(&self, id: u64) -> Result<Option<UploadRecord>> {
        self.records
            .get(&id)
            .map(|json| serde_json::from_str(json).map_err(ReviewError::from))
            .transpose()
    }
}

/// Runs the upload and review workflows against a store and a notifier.
///
/// The store write is the state transition; notifications go out after it and
/// cannot undo it.
pub struct ReviewService<S, N> {
    config: ReviewConfig,
    store: S,
    notifier: N,
}

impl<S: UploadStore, N: NotificationSink> ReviewService<S, N> {
    /// Fails with [`ReviewError::InvalidConfig`] when the configuration does
    /// not validate.
    pub fn new(config: ReviewConfig, store: S, notifier: N) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            notifier,
        })
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn create_upload(&mut self, filename: &str, rows: Vec<Row>) -> Result<Upload> {
        self.create_upload_at(filename, rows, Utc::now())
    }

    /// Ingests and stores a new upload. Invalid rows are rejected before an id
    /// is allocated or anything is stored.
    pub fn create_upload_at(
        &mut self,
        filename: &str,
        rows: Vec<Row>,
        now: DateTime<Utc>,
    ) -> Result<Upload> {
        let reviewed = Ingestor::new(&self.config).prepare(rows, now)?;
        let id = self.store.next_id()?;
        let upload = Upload::new(id, filename, reviewed, now);
        log_ingested(&upload);

        self.store.save(&upload.to_record())?;

        let events = NotificationPlanner::new(&self.config.notifications).upload_created(&upload);
        self.notify(&events);

        Ok(upload)
    }

    pub fn load_upload(&self, id: u64) -> Result<Upload> {
        self.store
            .load(id)?
            .map(Upload::from_record)
            .ok_or(ReviewError::UploadNotFound(id))
    }

    pub fn open_review(&self, id: u64) -> Result<ReviewSession> {
        ReviewSession::open(self.load_upload(id)?)
    }

    pub fn submit_review(&mut self, session: ReviewSession) -> Result<Upload> {
        self.submit_review_at(session, Utc::now())
    }

    pub fn submit_review_at(&mut self, session: ReviewSession, at: DateTime<Utc>) -> Result<Upload> {
        let submitted = session.submit(at)?;
        self.store.save(&submitted.upload.to_record())?;

        let events = NotificationPlanner::new(&self.config.notifications)
            .review_completed(&submitted.previous, &submitted.upload);
        self.notify(&events);

        Ok(submitted.upload)
    }

    pub fn mark_processed(&mut self, id: u64) -> Result<Upload> {
        let mut upload = self.load_upload(id)?;
        upload.mark_processed()?;
        self.store.save(&upload.to_record())?;
        info!("Upload {} marked as processed", id);
        Ok(upload)
    }

    pub fn export(&self, id: u64) -> Result<ExportTable> {
        let upload = self.load_upload(id)?;
        Ok(ExportProjector::new(&self.config.export).project_upload(&upload))
    }

    pub fn export_csv(&self, id: u64) -> Result<Vec<u8>> {
        self.export(id)?.to_csv(self.config.csv_delimiter_byte())
    }

    fn notify(&mut self, events: &[NotificationEvent]) {
        if events.is_empty() {
            return;
        }
        let report = dispatch(&mut self.notifier, events);
        if !report.all_delivered() {
            warn!(
                "{} of {} notifications could not be delivered",
                report.failed.len(),
                events.len()
            );
        }
    }
}
