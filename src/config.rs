use crate::error::{Result, ReviewError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Who gets told about uploads and reviews.
///
/// Passed explicitly into the notification planner; there is no process-wide
/// copy of these addresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NotificationSettings {
    #[schemars(description = "Address notified when a review is completed or a line is judged")]
    pub uploader_email: Option<String>,

    #[schemars(description = "Address notified when a new upload is waiting for review")]
    pub reviewer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExportOptions {
    #[schemars(description = "Field separator for CSV exports. Must be a single ASCII character.")]
    pub csv_delimiter: char,

    #[schemars(description = "Emit the general reviewer remarks above the table when they are not blank")]
    pub include_comment_block: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            csv_delimiter: ';',
            include_comment_block: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReviewConfig {
    pub notifications: NotificationSettings,

    #[schemars(description = "Start overdue invoice lines out as rejected when a file is ingested")]
    pub auto_reject_overdue: bool,

    pub export: ExportOptions,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            notifications: NotificationSettings::default(),
            auto_reject_overdue: true,
            export: ExportOptions::default(),
        }
    }
}

impl ReviewConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ReviewConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.export.csv_delimiter.is_ascii() {
            return Err(ReviewError::InvalidConfig(format!(
                "csv_delimiter '{}' is not an ASCII character",
                self.export.csv_delimiter
            )));
        }

        for (name, address) in [
            ("uploader_email", &self.notifications.uploader_email),
            ("reviewer_email", &self.notifications.reviewer_email),
        ] {
            if let Some(address) = address {
                if !address.contains('@') {
                    return Err(ReviewError::InvalidConfig(format!(
                        "{} '{}' is not an e-mail address",
                        name, address
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn csv_delimiter_byte(&self) -> u8 {
        u8::try_from(self.export.csv_delimiter).unwrap_or(b';')
    }
}
