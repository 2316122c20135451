//! Cell re-typing: decide once whether a cell is a number, a date, or text.
//!
//! Structuring keeps every cell as a string so nothing is lost; export wants
//! real numbers and dates so spreadsheets sort and sum correctly. The rules
//! here are deliberately conservative: anything ambiguous stays text, because
//! a wrongly-typed cell corrupts data while a text cell merely loses sorting.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Currency markers stripped before numeric parsing. Order matters: longer
/// codes first so `ETB` is removed before a bare `B` could confuse anything.
const CURRENCY_TOKENS: [&str; 8] = ["ETB", "USD", "EUR", "GBP", "Br", "$", "£", "€"];

static NUMERIC_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})*(\.\d+)?$|^[+-]?\d+(\.\d+)?$").unwrap());

/// A typed cell value ready for format-specific rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    /// Re-type one cell string.
    ///
    /// Recognized numbers may carry a currency token and thousands commas
    /// (`1,250.00 ETB`). Recognized dates are `YYYY-MM-DD`, `DD/MM/YYYY`, or
    /// `YYYY/MM/DD` — the day-first reading matches the documents this
    /// pipeline sees.
    pub fn from_cell(cell: &str) -> CellValue {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return CellValue::Text(String::new());
        }
        if let Some(n) = parse_number(trimmed) {
            return CellValue::Number(n);
        }
        if let Some(d) = parse_date(trimmed) {
            return CellValue::Date(d);
        }
        CellValue::Text(trimmed.to_string())
    }

    /// The string rendering used by formats without native cell types.
    pub fn display(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    let mut stripped = cell.to_string();
    for token in CURRENCY_TOKENS {
        stripped = stripped.replace(token, "");
    }
    let stripped = stripped.trim();
    if !NUMERIC_SHAPE.is_match(stripped) {
        return None;
    }
    let plain = stripped.replace(',', "");
    plain.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    for pattern in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(cell, pattern) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_grouped_numbers() {
        assert_eq!(CellValue::from_cell("300"), CellValue::Number(300.0));
        assert_eq!(
            CellValue::from_cell("1,250.00"),
            CellValue::Number(1250.0)
        );
        assert_eq!(CellValue::from_cell("-42.5"), CellValue::Number(-42.5));
    }

    #[test]
    fn currency_tokens_are_stripped() {
        assert_eq!(
            CellValue::from_cell("1,250.00 ETB"),
            CellValue::Number(1250.0)
        );
        assert_eq!(CellValue::from_cell("$99"), CellValue::Number(99.0));
        assert_eq!(CellValue::from_cell("Br 15"), CellValue::Number(15.0));
    }

    #[test]
    fn currency_without_digits_stays_text() {
        assert_eq!(
            CellValue::from_cell("ETB"),
            CellValue::Text("ETB".to_string())
        );
    }

    #[test]
    fn supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(CellValue::from_cell("2024-01-05"), CellValue::Date(expected));
        assert_eq!(CellValue::from_cell("05/01/2024"), CellValue::Date(expected));
        assert_eq!(CellValue::from_cell("2024/01/05"), CellValue::Date(expected));
    }

    #[test]
    fn ambiguous_content_stays_text() {
        for cell in ["12 Jan 2024", "acct 0012", "1.2.3", "ገቢ", "O123"] {
            assert!(
                matches!(CellValue::from_cell(cell), CellValue::Text(_)),
                "{cell} should stay text"
            );
        }
    }

    #[test]
    fn display_round_trips_sanely() {
        assert_eq!(CellValue::from_cell("300").display(), "300");
        assert_eq!(CellValue::from_cell("05/01/2024").display(), "2024-01-05");
        assert_eq!(CellValue::from_cell("hello").display(), "hello");
    }
}
