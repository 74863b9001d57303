use crate::config::NotificationSettings;
use crate::error::Result;
use crate::schema::RowOutcome;
use crate::upload::{ReviewedRow, Upload};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    UploadCreated,
    ReviewCompleted,
    RowApproved,
    RowRejected,
}

/// Payload for the mail collaborator. Rendering and delivery happen there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient: String,
    pub upload_id: u64,
    pub filename: String,
    pub action: NotificationAction,
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default)]
    pub comment: Option<String>,
}

pub trait NotificationSink {
    fn deliver(&mut self, event: &NotificationEvent) -> Result<()>;
}

impl NotificationSink for Vec<NotificationEvent> {
    fn deliver(&mut self, event: &NotificationEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Decides which notifications a committed state change warrants.
pub struct NotificationPlanner<'a> {
    settings: &'a NotificationSettings,
}

impl<'a> NotificationPlanner<'a> {
    pub fn new(settings: &'a NotificationSettings) -> Self {
        Self { settings }
    }

    /// A new upload waits for the reviewer.
    pub fn upload_created(&self, upload: &Upload) -> Vec<NotificationEvent> {
        let Some(reviewer) = self.settings.reviewer_email.as_deref() else {
            debug!("No reviewer address configured, upload {} goes unannounced", upload.id());
            return Vec::new();
        };

        vec![event(reviewer, upload, NotificationAction::UploadCreated, None, None)]
    }

    /// Tells the uploader which rows changed verdict and that the review is done.
    ///
    /// `before` is the row set as it was when the review started. Rows that end
    /// up pending, or keep the verdict they had, produce no row event.
    pub fn review_completed(
        &self,
        before: &[ReviewedRow],
        upload: &Upload,
    ) -> Vec<NotificationEvent> {
        let Some(uploader) = self.settings.uploader_email.as_deref() else {
            debug!("No uploader address configured, review of upload {} goes unannounced", upload.id());
            return Vec::new();
        };

        let mut events: Vec<NotificationEvent> = upload
            .rows()
            .iter()
            .enumerate()
            .filter(|(idx, row)| before.get(*idx).map(ReviewedRow::outcome) != Some(row.outcome()))
            .filter_map(|(idx, row)| {
                let action = match row.outcome() {
                    RowOutcome::Approved => NotificationAction::RowApproved,
                    RowOutcome::Rejected => NotificationAction::RowRejected,
                    RowOutcome::Pending => return None,
                };
                let comment = row
                    .annotation
                    .has_comment()
                    .then(|| row.annotation.comments.clone());
                Some(event(uploader, upload, action, Some(idx), comment))
            })
            .collect();

        let overall = upload.overall_comments().trim();
        let comment = (!overall.is_empty()).then(|| overall.to_string());
        events.push(event(
            uploader,
            upload,
            NotificationAction::ReviewCompleted,
            None,
            comment,
        ));

        events
    }
}

fn event(
    recipient: &str,
    upload: &Upload,
    action: NotificationAction,
    row: Option<usize>,
    comment: Option<String>,
) -> NotificationEvent {
    NotificationEvent {
        recipient: recipient.to_string(),
        upload_id: upload.id(),
        filename: upload.filename().to_string(),
        action,
        row,
        comment,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<(NotificationAction, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Hands every event to the sink. Failures are logged and collected, never
/// returned as errors: the state change that caused them is already committed.
pub fn dispatch<S>(sink: &mut S, events: &[NotificationEvent]) -> DispatchReport
where
    S: NotificationSink + ?Sized,
{
    let mut report = DispatchReport::default();
    for event in events {
        match sink.deliver(event) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                warn!(
                    "Failed to deliver {:?} for upload {} to {}: {}",
                    event.action, event.upload_id, event.recipient, err
                );
                report.failed.push((event.action, err.to_string()));
            }
        }
    }
    report
}
