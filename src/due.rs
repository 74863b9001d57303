use crate::columns::LogicalField;
use crate::schema::Row;
use crate::utils::{days_until, parse_date_cell, parse_integer_cell};
use chrono::{DateTime, Days, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a row's due state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueSource {
    /// Invoice date plus payment term.
    DateAndTerm,
    /// A "days open" column already present in the sheet.
    DaysOpenColumn,
}

/// Computed due state of a row. Positive is not yet due, negative is overdue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueState {
    pub days_remaining: i64,
    pub source: DueSource,
    pub due_date: Option<NaiveDate>,
}

impl DueState {
    pub fn is_overdue(&self) -> bool {
        self.days_remaining < 0
    }

    pub fn label(&self) -> String {
        match self.days_remaining {
            0 => "Vandaag".to_string(),
            1 => "Nog 1 dag".to_string(),
            -1 => "1 dag te laat".to_string(),
            d if d > 0 => format!("Nog {} dagen", d),
            d => format!("{} dagen te laat", -d),
        }
    }
}

impl fmt::Display for DueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Due state of `row` at `now`.
///
/// Invoice date plus payment term wins. When either is missing or unreadable the
/// sheet's own "days open" column is used as-is. `None` means no due state can be
/// computed, which is not the same as being due today.
pub fn due_state(row: &Row, now: DateTime<Utc>) -> Option<DueState> {
    from_date_and_term(row, now).or_else(|| from_days_open(row))
}

pub fn days_remaining(row: &Row, now: DateTime<Utc>) -> Option<i64> {
    due_state(row, now).map(|state| state.days_remaining)
}

/// Whether ingestion should start this row out as rejected.
pub fn is_overdue(row: &Row, now: DateTime<Utc>) -> bool {
    due_state(row, now).is_some_and(|state| state.is_overdue())
}

pub fn due_date(row: &Row) -> Option<NaiveDate> {
    let invoice_date = parse_date_cell(LogicalField::InvoiceDate.value(row)?)?;
    let term = parse_integer_cell(LogicalField::PaymentTerm.value(row)?)?;

    if term >= 0 {
        invoice_date.checked_add_days(Days::new(term as u64))
    } else {
        invoice_date.checked_sub_days(Days::new(term.unsigned_abs()))
    }
}

fn from_date_and_term(row: &Row, now: DateTime<Utc>) -> Option<DueState> {
    let due = due_date(row)?;
    let days_remaining = days_until(due, now)?;
    debug!("Due date {} gives {} days remaining", due, days_remaining);

    Some(DueState {
        days_remaining,
        source: DueSource::DateAndTerm,
        due_date: Some(due),
    })
}

fn from_days_open(row: &Row) -> Option<DueState> {
    let days_remaining = parse_integer_cell(LogicalField::DaysOpen.value(row)?)?;

    Some(DueState {
        days_remaining,
        source: DueSource::DaysOpenColumn,
        due_date: None,
    })
}
