//! Column-name resolution for uploaded sheets.
//!
//! Uploads come from different bookkeeping packages, so the same logical field
//! shows up under different spellings. Every lookup goes through [`LogicalField`]
//! and its alias table instead of probing literal names at the call site.

use crate::schema::{CellValue, Row};
use log::debug;

pub const INTERNAL_PREFIX: char = '_';
pub const STATUS_FIELD: &str = "_status";
pub const COMMENTS_FIELD: &str = "_comments";
pub const REJECTED_FIELD: &str = "_rejected";

/// Column appended by the normalizer when a relation column has no title.
pub const TITLE_COLUMN: &str = "titel";

const CURRENCY_KEYWORDS: &[&str] = &["bedrag", "totaal", "prijs", "kosten", "waarde"];
const CURRENCY_EXCLUSIONS: &[&str] = &["verwerking", "valuta"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    InvoiceDate,
    PaymentTerm,
    DaysOpen,
    DebtorNumber,
    Relation,
    Title,
    /// Boolean approval column some older exports still carry.
    LegacyApproved,
    /// Boolean rejection column some older exports still carry.
    LegacyRejected,
}

impl LogicalField {
    /// Literal column names in priority order.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            LogicalField::InvoiceDate => &["Factuurdatum", "factuurdatum"],
            LogicalField::PaymentTerm => {
                &["Betalingstermijn", "betalingstermijn", "Termijn", "termijn"]
            }
            LogicalField::DaysOpen => &["Aantal dagen openstaand", "aantal dagen openstaand"],
            LogicalField::DebtorNumber => &[
                "Debiteurnummer",
                "debiteurnummer",
                "Debiteur",
                "debiteur",
                "Relatienummer",
                "relatienummer",
            ],
            LogicalField::Relation => &["Relatie", "relatie", "Relatienaam", "relatienaam"],
            LogicalField::Title => &["Titel", "titel"],
            LogicalField::LegacyApproved => &["Akkoord", "akkoord"],
            LogicalField::LegacyRejected => &["Afgewezen", "afgewezen"],
        }
    }

    /// Returns the first column present in `row`, as `(column, value)`.
    ///
    /// Exact aliases are tried first, in order. When none match, a
    /// case-insensitive comparison against the trimmed column names is used.
    pub fn resolve(self, row: &Row) -> Option<(&str, &CellValue)> {
        let aliases = self.aliases();

        for alias in aliases {
            if let Some(found) = row.iter().find(|(column, _)| column == alias) {
                return Some(found);
            }
        }

        let found = row.iter().find(|(column, _)| {
            let column = column.trim();
            aliases.iter().any(|alias| alias.eq_ignore_ascii_case(column))
        });
        if let Some((column, _)) = found {
            debug!("Resolved {:?} through loose match on column '{}'", self, column);
        }
        found
    }

    pub fn value(self, row: &Row) -> Option<&CellValue> {
        self.resolve(row).map(|(_, value)| value)
    }

    /// True when the column name is one of this field's aliases, ignoring case.
    pub fn matches_column(self, column: &str) -> bool {
        let column = column.trim();
        self.aliases()
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(column))
    }
}

pub fn is_internal_column(column: &str) -> bool {
    column.starts_with(INTERNAL_PREFIX)
}

pub fn is_legacy_review_column(column: &str) -> bool {
    LogicalField::LegacyApproved.matches_column(column)
        || LogicalField::LegacyRejected.matches_column(column)
}

/// Columns that never reach an export: internal bookkeeping and the legacy
/// approval booleans, which are replaced by the synthesized status column.
pub fn is_exportable_column(column: &str) -> bool {
    !is_internal_column(column) && !is_legacy_review_column(column)
}

/// Naming heuristic for monetary columns. Affects formatting only.
pub fn is_currency_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    CURRENCY_KEYWORDS.iter().any(|k| lower.contains(k))
        && !CURRENCY_EXCLUSIONS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> Row {
        cells
            .iter()
            .map(|(k, v)| (*k, CellValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_resolve_prefers_alias_order() {
        let r = row(&[("termijn", "14"), ("Betalingstermijn", "30")]);
        let (column, value) = LogicalField::PaymentTerm.resolve(&r).unwrap();
        assert_eq!(column, "Betalingstermijn");
        assert_eq!(value, &CellValue::from("30"));
    }

    #[test]
    fn test_resolve_falls_back_to_case_insensitive_match() {
        let r = row(&[("FACTUURDATUM ", "2024-01-01")]);
        let (column, _) = LogicalField::InvoiceDate.resolve(&r).unwrap();
        assert_eq!(column, "FACTUURDATUM ");
    }

    #[test]
    fn test_resolve_missing_field() {
        let r = row(&[("Omschrijving", "Huur")]);
        assert!(LogicalField::InvoiceDate.resolve(&r).is_none());
        assert!(LogicalField::DaysOpen.value(&r).is_none());
    }

    #[test]
    fn test_currency_column_detection() {
        assert!(is_currency_column("Bedrag"));
        assert!(is_currency_column("Totaal incl. BTW"));
        assert!(is_currency_column("Openstaande waarde"));
        assert!(is_currency_column("Verzendkosten"));
        assert!(!is_currency_column("Verwerkingskosten"));
        assert!(!is_currency_column("Bedrag valuta"));
        assert!(!is_currency_column("Factuurnummer"));
    }

    #[test]
    fn test_exportable_columns() {
        assert!(!is_exportable_column("_status"));
        assert!(!is_exportable_column("_comments"));
        assert!(!is_exportable_column("Akkoord"));
        assert!(!is_exportable_column("afgewezen"));
        assert!(is_exportable_column("Relatie"));
        assert!(is_exportable_column("titel"));
    }
}
