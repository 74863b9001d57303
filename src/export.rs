//! Projection of a reviewed upload into an export table.
//!
//! The table is what spreadsheet and PDF writers consume: original columns
//! without internal bookkeeping, plus a status and a comments column, rows
//! ordered by debtor number. Projection is a pure function of the rows and the
//! overall comments, so exporting the same review twice gives identical output.

use crate::columns::{is_currency_column, is_exportable_column, LogicalField};
use crate::config::ExportOptions;
use crate::error::{Result, ReviewError};
use crate::schema::{CellValue, Row, RowOutcome};
use crate::upload::{ReviewedRow, Upload};
use crate::utils::{format_currency, natural_cmp, parse_amount};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const STATUS_HEADER: &str = "Status";
pub const COMMENTS_HEADER: &str = "Opmerkingen";
pub const COMMENT_BLOCK_TITLE: &str = "Algemene Reviewer Opmerkingen";
pub const APPROVED_LABEL: &str = "Goedgekeurd";
pub const REJECTED_LABEL: &str = "Probleem";

/// Pending rows export as approved; only an explicit rejection is a problem.
pub fn status_label(outcome: RowOutcome) -> &'static str {
    match outcome {
        RowOutcome::Rejected => REJECTED_LABEL,
        RowOutcome::Approved | RowOutcome::Pending => APPROVED_LABEL,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportCell {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl ExportCell {
    pub fn empty() -> Self {
        ExportCell::Text(String::new())
    }

    pub fn to_plain_string(&self) -> String {
        match self {
            ExportCell::Text(s) => s.clone(),
            ExportCell::Number(n) => CellValue::Number(*n).to_plain_string(),
            ExportCell::Bool(b) => b.to_string(),
        }
    }
}

impl From<&CellValue> for ExportCell {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Null => ExportCell::empty(),
            CellValue::Bool(b) => ExportCell::Bool(*b),
            CellValue::Number(n) => ExportCell::Number(*n),
            CellValue::Text(s) => ExportCell::Text(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    /// Lines of the general reviewer remarks, one entry per input line.
    pub info_lines: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ExportCell>>,
}

pub struct ExportProjector {
    include_comment_block: bool,
}

impl Default for ExportProjector {
    fn default() -> Self {
        Self::new(&ExportOptions::default())
    }
}

impl ExportProjector {
    pub fn new(options: &ExportOptions) -> Self {
        Self {
            include_comment_block: options.include_comment_block,
        }
    }

    pub fn project_upload(&self, upload: &Upload) -> ExportTable {
        self.project(upload.rows(), upload.overall_comments())
    }

    /// Projects working rows that still carry their `_status`/`_comments`/
    /// `_rejected` fields.
    pub fn project_payload(&self, rows: &[Row], overall_comments: &str) -> ExportTable {
        let reviewed: Vec<ReviewedRow> = rows
            .iter()
            .cloned()
            .map(ReviewedRow::from_payload)
            .collect();
        self.project(&reviewed, overall_comments)
    }

    pub fn project(&self, rows: &[ReviewedRow], overall_comments: &str) -> ExportTable {
        let source_columns = export_columns(rows);

        let mut ordered: Vec<&ReviewedRow> = rows.iter().collect();
        ordered.sort_by(|a, b| natural_cmp(&debtor_key(a), &debtor_key(b)));

        let table_rows = ordered
            .into_iter()
            .map(|row| {
                let mut cells: Vec<ExportCell> = source_columns
                    .iter()
                    .map(|column| {
                        row.cells
                            .get(column)
                            .map(ExportCell::from)
                            .unwrap_or_else(ExportCell::empty)
                    })
                    .collect();
                cells.push(ExportCell::Text(status_label(row.outcome()).to_string()));
                cells.push(ExportCell::Text(row.annotation.comments.clone()));
                cells
            })
            .collect();

        let mut columns: Vec<String> = source_columns.iter().map(|c| export_header(c)).collect();
        columns.push(STATUS_HEADER.to_string());
        columns.push(COMMENTS_HEADER.to_string());

        let info_lines = if self.include_comment_block {
            comment_lines(overall_comments)
        } else {
            Vec::new()
        };

        info!(
            "Projected {} rows into {} export columns",
            rows.len(),
            columns.len()
        );

        ExportTable {
            info_lines,
            columns,
            rows: table_rows,
        }
    }
}

/// Original columns across all rows, in first-seen order, minus internal and
/// legacy review columns.
fn export_columns(rows: &[ReviewedRow]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for column in row.cells.columns() {
            if is_exportable_column(column) && !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }
    debug!("Export columns: {:?}", columns);
    columns
}

/// Header for a source column. A sheet that already has a `Status` or
/// `Opmerkingen` column keeps it under a suffixed name, so the synthesized
/// columns stay unique.
fn export_header(column: &str) -> String {
    let trimmed = column.trim();
    if trimmed.eq_ignore_ascii_case(STATUS_HEADER) || trimmed.eq_ignore_ascii_case(COMMENTS_HEADER)
    {
        format!("{} (bron)", trimmed)
    } else {
        column.to_string()
    }
}

fn debtor_key(row: &ReviewedRow) -> String {
    LogicalField::DebtorNumber
        .value(&row.cells)
        .map(CellValue::to_plain_string)
        .unwrap_or_default()
}

fn comment_lines(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.lines().map(|line| line.trim_end().to_string()).collect()
}

impl ExportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Full sheet layout: remarks block (when present), a blank separator row,
    /// the header row, then data rows.
    pub fn to_grid(&self) -> Vec<Vec<ExportCell>> {
        let mut grid = Vec::with_capacity(self.rows.len() + self.info_lines.len() + 3);

        if !self.info_lines.is_empty() {
            grid.push(vec![ExportCell::Text(COMMENT_BLOCK_TITLE.to_string())]);
            for line in &self.info_lines {
                grid.push(vec![ExportCell::Text(line.clone())]);
            }
            grid.push(Vec::new());
        }

        grid.push(
            self.columns
                .iter()
                .map(|c| ExportCell::Text(c.clone()))
                .collect(),
        );
        grid.extend(self.rows.iter().cloned());
        grid
    }

    /// Data rows as display strings, with monetary columns in euro notation.
    pub fn to_display_rows(&self) -> Vec<Vec<String>> {
        let currency: Vec<bool> = self
            .columns
            .iter()
            .map(|c| is_currency_column(c))
            .collect();

        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| {
                        if currency.get(idx).copied().unwrap_or(false) {
                            display_amount(cell)
                        } else {
                            cell.to_plain_string()
                        }
                    })
                    .collect()
            })
            .collect()
    }

    pub fn to_csv(&self, delimiter: u8) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_writer(Vec::new());

        if !self.info_lines.is_empty() {
            writer.write_record([COMMENT_BLOCK_TITLE])?;
            for line in &self.info_lines {
                writer.write_record([line.as_str()])?;
            }
            writer.write_record([""])?;
        }

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(ExportCell::to_plain_string))?;
        }

        writer
            .into_inner()
            .map_err(|e| ReviewError::IoError(e.into_error()))
    }

    pub fn to_markdown(&self, title: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("# {}\n\n", title));

        if !self.info_lines.is_empty() {
            output.push_str(&format!("## {}\n\n", COMMENT_BLOCK_TITLE));
            for line in &self.info_lines {
                output.push_str(line);
                output.push_str("\n\n");
            }
        }

        output.push_str(&markdown_row(self.columns.iter().map(String::as_str)));
        output.push_str(&markdown_row(self.columns.iter().map(|_| "---")));
        for row in self.to_display_rows() {
            output.push_str(&markdown_row(row.iter().map(String::as_str)));
        }

        if self.rows.is_empty() {
            output.push_str("\n_Geen factuurregels._\n");
        }

        output
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn display_amount(cell: &ExportCell) -> String {
    match cell {
        ExportCell::Number(n) => format_currency(*n),
        ExportCell::Text(s) => parse_amount(s)
            .map(format_currency)
            .unwrap_or_else(|| s.clone()),
        ExportCell::Bool(b) => b.to_string(),
    }
}

fn markdown_row<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let escaped: Vec<String> = cells
        .map(|cell| cell.replace('|', "\\|").replace(['\r', '\n'], " "))
        .collect();
    format!("| {} |\n", escaped.join(" | "))
}
