use crate::schema::CellValue;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use std::cmp::Ordering;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Spreadsheet serial numbers count from 1899-12-30 in the 1900 date system.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
const MAX_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Reads a calendar date from a cell.
///
/// Text cells accept ISO dates (optionally with a time part, which is dropped)
/// and the day-first notations used by Dutch bookkeeping exports. Numeric cells
/// are spreadsheet serial day numbers.
pub fn parse_date_cell(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Text(text) => parse_date_text(text),
        CellValue::Number(serial) => serial_to_date(*serial),
        _ => None,
    }
}

pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Reads an integer from a cell.
///
/// Text takes its leading integer, so "30 dagen" reads as 30. Numbers must be
/// integral; 30.5 is not a term.
pub fn parse_integer_cell(value: &CellValue) -> Option<i64> {
    match value {
        CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        CellValue::Text(text) => parse_leading_integer(text),
        _ => None,
    }
}

pub fn parse_leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };

    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());

    if end == 0 {
        return None;
    }

    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Whole days from `now` until midnight UTC of `due`, rounded up.
///
/// A due date later today yields 0, never -1.
pub fn days_until(due: NaiveDate, now: DateTime<Utc>) -> Option<i64> {
    let due_instant = due.and_hms_opt(0, 0, 0)?.and_utc();
    let millis = (due_instant - now).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    let rest = millis.rem_euclid(MILLIS_PER_DAY);
    Some(if rest > 0 { whole + 1 } else { whole })
}

/// Compares strings the way a person sorts debtor numbers: digit runs by value,
/// everything else case-insensitively. "9" sorts before "10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = compare_chunks(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunks(l: &str, r: &str) -> Ordering {
    let l_digit = l.starts_with(|c: char| c.is_ascii_digit());
    let r_digit = r.starts_with(|c: char| c.is_ascii_digit());

    match (l_digit, r_digit) {
        (true, true) => {
            let l_trim = l.trim_start_matches('0');
            let r_trim = r.trim_start_matches('0');
            l_trim
                .len()
                .cmp(&r_trim.len())
                .then_with(|| l_trim.cmp(r_trim))
                .then_with(|| l.len().cmp(&r.len()))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => l.to_lowercase().cmp(&r.to_lowercase()),
    }
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Reads an amount written in either Dutch ("1.234,56") or plain ("1234.56")
/// notation, with an optional euro sign.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('€')
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if is_dot_grouped(&cleaned) => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// "1.250" and "1.250.000": a leading group of one to three digits (not
/// starting with 0) followed by groups of exactly three, separated by dots.
fn is_dot_grouped(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let groups: Vec<&str> = digits.split('.').collect();
    let Some((lead, rest)) = groups.split_first() else {
        return false;
    };

    let all_digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());
    (1..=3).contains(&lead.len())
        && !lead.starts_with('0')
        && all_digits(*lead)
        && !rest.is_empty()
        && rest.iter().all(|g| g.len() == 3 && all_digits(*g))
}

/// Formats an amount in Dutch notation: `€ 1.234,56`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("€ {}{},{:02}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_text_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(parse_date_text("2024-01-31"), Some(expected));
        assert_eq!(parse_date_text("31-01-2024"), Some(expected));
        assert_eq!(parse_date_text("31/01/2024"), Some(expected));
        assert_eq!(parse_date_text("31.01.2024"), Some(expected));
        assert_eq!(parse_date_text("2024-01-31T10:15:00"), Some(expected));
        assert_eq!(parse_date_text("2024-01-31T10:15:00Z"), Some(expected));
        assert_eq!(parse_date_text("morgen"), None);
        assert_eq!(parse_date_text(""), None);
    }

    #[test]
    fn test_serial_dates() {
        // 45292 is 2024-01-01 in the 1900 date system.
        assert_eq!(
            parse_date_cell(&CellValue::Number(45292.0)),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(serial_to_date(0.0), None);
        assert_eq!(serial_to_date(-5.0), None);
        assert_eq!(parse_date_cell(&CellValue::Bool(true)), None);
    }

    #[test]
    fn test_parse_integer_cell() {
        assert_eq!(parse_integer_cell(&CellValue::from("30")), Some(30));
        assert_eq!(parse_integer_cell(&CellValue::from(" 14 dagen")), Some(14));
        assert_eq!(parse_integer_cell(&CellValue::from("-3")), Some(-3));
        assert_eq!(parse_integer_cell(&CellValue::Number(60.0)), Some(60));
        assert_eq!(parse_integer_cell(&CellValue::Number(7.5)), None);
        assert_eq!(parse_integer_cell(&CellValue::from("dertig")), None);
        assert_eq!(parse_integer_cell(&CellValue::Null), None);
    }

    #[test]
    fn test_days_until_rounds_up() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(days_until(due, midnight), Some(9));

        let morning = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(days_until(due, morning), Some(9));

        let same_day = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(days_until(due, same_day), Some(0));

        let later_that_day = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        assert_eq!(days_until(due, later_that_day), Some(0));

        let next_day = Utc.with_ymd_and_hms(2024, 3, 11, 15, 0, 0).unwrap();
        assert_eq!(days_until(due, next_day), Some(-1));
    }

    #[test]
    fn test_natural_cmp() {
        let mut values = vec!["10", "2", "1"];
        values.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(values, vec!["1", "2", "10"]);

        assert_eq!(natural_cmp("D9", "D10"), Ordering::Less);
        assert_eq!(natural_cmp("abc", "ABC"), Ordering::Equal);
        assert_eq!(natural_cmp("", "1"), Ordering::Less);
        assert_eq!(natural_cmp("007", "7"), Ordering::Greater);
        assert_eq!(natural_cmp("1000", "999"), Ordering::Greater);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("12,50"), Some(12.5));
        assert_eq!(parse_amount("€ 99.95"), Some(99.95));
        assert_eq!(parse_amount("n.v.t."), None);
        assert_eq!(parse_amount("1.250"), Some(1250.0));
        assert_eq!(parse_amount("€ 1.250.000"), Some(1_250_000.0));
        assert_eq!(parse_amount("-2.500"), Some(-2500.0));
        assert_eq!(parse_amount("0.125"), Some(0.125));
        assert_eq!(parse_amount("12.5"), Some(12.5));
        assert_eq!(parse_amount("1.25.000"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.56), "€ 1.234,56");
        assert_eq!(format_currency(0.5), "€ 0,50");
        assert_eq!(format_currency(1_000_000.0), "€ 1.000.000,00");
        assert_eq!(format_currency(-42.1), "€ -42,10");
        assert_eq!(format_currency(-0.001), "€ 0,00");
    }
}
