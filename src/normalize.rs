// 🧹 Field normalization - amounts, dates, account numbers, quarters
//
// Pure functions shared by the tabular and JSON import paths. They never
// fail loudly: `None` means "this cell cannot be used", and the processor
// turns that into a `RowError` for the import report.

use crate::file_handler::Cell;
use crate::settings::DecimalFormat;
use chrono::{Datelike, Duration, NaiveDate};

/// Date formats tried in order; the first match wins
pub const DATE_FORMATS: &[&str] = &["%Y.%m.%d", "%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

const CURRENCY_MARKERS: &[&str] = &["EUR", "USD", "CHF", "€", "$", "£"];

// Serial range Excel can represent (1900-01-01 .. 9999-12-31)
const EXCEL_SERIAL_MIN: f64 = 1.0;
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

// ============================================================================
// AMOUNTS
// ============================================================================

/// Clean an amount cell. Numeric cells are already clean and pass through.
pub fn clean_amount(cell: &Cell, format: DecimalFormat) -> Option<f64> {
    match cell {
        Cell::Number(value) if value.is_finite() => Some(*value),
        Cell::Text(text) => clean_amount_str(text, format),
        _ => None,
    }
}

/// Clean a textual amount such as `"1.234,56 €"`, `"-450.00"` or `"(12,50)"`
///
/// Currency markers and whitespace are removed, then the separators are
/// swapped according to `format`. Under `German`, a text with no comma whose
/// single dot is not followed by exactly three digits is taken as an already
/// clean float (`"1000.50"`).
pub fn clean_amount_str(raw: &str, format: DecimalFormat) -> Option<f64> {
    let mut text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    for marker in CURRENCY_MARKERS {
        if text.contains(marker) {
            text = text.replace(marker, "");
        }
    }

    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        negative = true;
        text = inner.to_string();
    }
    if let Some(inner) = text.strip_suffix('-') {
        negative = !negative;
        text = inner.to_string();
    }

    if text.is_empty() {
        return None;
    }

    let normalized = match format {
        DecimalFormat::German => {
            if text.contains(',') {
                text.replace('.', "").replace(',', ".")
            } else if has_thousands_dots(&text) {
                text.replace('.', "")
            } else {
                text
            }
        }
        DecimalFormat::English => text.replace(',', ""),
    };

    let value: f64 = normalized.parse().ok().filter(|v: &f64| v.is_finite())?;
    Some(if negative { -value } else { value })
}

/// `1.234` / `1.234.567` use dots as thousands separators; `1000.50` does not
fn has_thousands_dots(text: &str) -> bool {
    let digits = text.trim_start_matches(['-', '+']);
    let groups: Vec<&str> = digits.split('.').collect();
    if groups.len() < 2 {
        return false;
    }
    if groups.len() > 2 {
        return true;
    }
    !groups[0].is_empty() && groups[1].len() == 3 && groups[1].chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a date cell. Spreadsheet dates and Excel serial numbers are
/// converted directly; text goes through `DATE_FORMATS`.
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(date) => Some(*date),
        Cell::Number(serial) => excel_serial_to_date(*serial),
        Cell::Text(text) => parse_date_str(text),
        Cell::Empty => None,
    }
}

/// Parse a textual date; a trailing time component is ignored
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or("");

    if date_part.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .filter(|format| has_four_digit_year(date_part, format))
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

// chrono's %Y also takes "24"; only a four-digit year token is a year
fn has_four_digit_year(date_part: &str, format: &str) -> bool {
    let mut tokens = date_part
        .split(|c: char| !c.is_ascii_digit())
        .filter(|t| !t.is_empty());
    let year = if format.starts_with("%Y") {
        tokens.next()
    } else {
        tokens.last()
    };
    year.map_or(false, |t| t.len() == 4)
}

/// Excel stores dates as days since 1899-12-30 (the 1900 leap-year bug
/// shifts the epoch by one day)
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

// ============================================================================
// ACCOUNT NUMBERS
// ============================================================================

/// Normalize an account cell into the lookup key used by the mappings
pub fn normalize_account_number(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Number(value) if value.is_finite() => Some(format!("{}", value.trunc() as i64)),
        Cell::Text(text) => {
            let normalized = normalize_account_str(text);
            if normalized.is_empty() {
                None
            } else {
                Some(normalized)
            }
        }
        _ => None,
    }
}

/// `"1000"`, `"1000.0"` and `" 1000 "` all become `"1000"`; non-numeric
/// account keys (e.g. `"K-100A"`) are only trimmed
pub fn normalize_account_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if is_plain_number(trimmed) {
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return format!("{}", value.trunc() as i64);
            }
        }
    }
    trimmed.to_string()
}

/// Digits with an optional leading minus and at most one decimal point
fn is_plain_number(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    if body.is_empty() || body == "." {
        return false;
    }
    let mut dots = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => {}
            '.' => {
                dots += 1;
                if dots > 1 {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// Sort key that orders numeric account numbers numerically
pub fn account_sort_key(account: &str) -> (u8, u64, String) {
    match account.parse::<u64>() {
        Ok(number) => (0, number, String::new()),
        Err(_) => (1, 0, account.to_string()),
    }
}

// ============================================================================
// QUARTERS
// ============================================================================

/// 1-3 → Q1, 4-6 → Q2, 7-9 → Q3, 10-12 → Q4
pub fn quarter_of_month(month: u32) -> u8 {
    (((month.clamp(1, 12) - 1) / 3) + 1) as u8
}

pub fn quarter_of(date: NaiveDate) -> u8 {
    quarter_of_month(date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_account_number_variants_normalize_identically() {
        assert_eq!(normalize_account_number(&text("1000")).unwrap(), "1000");
        assert_eq!(normalize_account_number(&Cell::Number(1000.0)).unwrap(), "1000");
        assert_eq!(normalize_account_number(&text("1000.0")).unwrap(), "1000");
        assert_eq!(normalize_account_number(&text(" 1000 ")).unwrap(), "1000");
    }

    #[test]
    fn test_account_number_non_numeric_kept() {
        assert_eq!(normalize_account_str("K-100A"), "K-100A");
        assert_eq!(normalize_account_str("-"), "-");
        assert_eq!(normalize_account_str("1.2.3"), "1.2.3");
        assert_eq!(normalize_account_number(&text("   ")), None);
        assert_eq!(normalize_account_number(&Cell::Empty), None);
    }

    #[test]
    fn test_clean_amount_german() {
        let de = DecimalFormat::German;
        assert_eq!(clean_amount_str("1.234,56", de), Some(1234.56));
        assert_eq!(clean_amount_str("1.234.567,89 €", de), Some(1234567.89));
        assert_eq!(clean_amount_str("-450,00", de), Some(-450.0));
        assert_eq!(clean_amount_str("450,00-", de), Some(-450.0));
        assert_eq!(clean_amount_str("1.234", de), Some(1234.0));
        assert_eq!(clean_amount_str("1000.50", de), Some(1000.5));
        assert_eq!(clean_amount_str("EUR 12,5", de), Some(12.5));
    }

    #[test]
    fn test_clean_amount_english() {
        let en = DecimalFormat::English;
        assert_eq!(clean_amount_str("1,234.56", en), Some(1234.56));
        assert_eq!(clean_amount_str("$ 1,000", en), Some(1000.0));
        assert_eq!(clean_amount_str("(12.50)", en), Some(-12.5));
        assert_eq!(clean_amount_str("-0.99", en), Some(-0.99));
    }

    #[test]
    fn test_clean_amount_is_idempotent_on_clean_numbers() {
        for format in [DecimalFormat::German, DecimalFormat::English] {
            for value in [0.0, 1234.56, -450.0, 1000.5, 0.01] {
                assert_eq!(clean_amount(&Cell::Number(value), format), Some(value));
            }
        }
        assert_eq!(clean_amount_str("1234.56", DecimalFormat::English), Some(1234.56));
        assert_eq!(clean_amount_str("1234.56", DecimalFormat::German), Some(1234.56));
    }

    #[test]
    fn test_clean_amount_rejects_garbage() {
        assert_eq!(clean_amount_str("", DecimalFormat::German), None);
        assert_eq!(clean_amount_str("€", DecimalFormat::German), None);
        assert_eq!(clean_amount_str("abc", DecimalFormat::German), None);
        assert_eq!(clean_amount_str("NaN", DecimalFormat::English), None);
        assert_eq!(clean_amount(&Cell::Empty, DecimalFormat::German), None);
    }

    #[test]
    fn test_parse_date_formats_in_order() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert_eq!(parse_date_str("2024.01.15"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date_str("15.01.2024"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date_str("2024-01-15"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date_str("15/01/2024"), Some(d(2024, 1, 15)));
        // day-first wins when both readings are valid
        assert_eq!(parse_date_str("02/03/2024"), Some(d(2024, 3, 2)));
        // only month-first is valid here
        assert_eq!(parse_date_str("12/31/2024"), Some(d(2024, 12, 31)));
        assert_eq!(parse_date_str("2024-01-15 00:00:00"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date_str("2024-01-15T08:30:00"), Some(d(2024, 1, 15)));
        assert_eq!(parse_date_str("31.02.2024"), None);
        assert_eq!(parse_date_str("gestern"), None);
        assert_eq!(parse_date_str(""), None);
    }

    #[test]
    fn test_two_digit_years_are_rejected() {
        assert_eq!(parse_date_str("15/01/24"), None);
        assert_eq!(parse_date_str("15.01.24"), None);
        assert_eq!(parse_date_str("24-01-15"), None);
        assert_eq!(parse_date(&Cell::text("01/15/24")), None);
        assert_eq!(
            parse_date_str("15.01.2024"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
    }

    #[test]
    fn test_parse_date_cells() {
        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date(&Cell::Date(jan15)), Some(jan15));
        // 45306 = 2024-01-15 in Excel's serial calendar
        assert_eq!(parse_date(&Cell::Number(45306.0)), Some(jan15));
        assert_eq!(parse_date(&Cell::Number(-3.0)), None);
        assert_eq!(parse_date(&Cell::Empty), None);
    }

    #[test]
    fn test_quarter_partition() {
        let expected = [1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];
        for (month, quarter) in (1..=12).zip(expected) {
            assert_eq!(quarter_of_month(month), quarter, "month {}", month);
        }
        let date = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert_eq!(quarter_of(date), 4);
    }

    #[test]
    fn test_account_sort_key_orders_numerically() {
        let mut accounts = vec!["10000", "4000", "K-1", "800"];
        accounts.sort_by_key(|a| account_sort_key(a));
        assert_eq!(accounts, vec!["800", "4000", "10000", "K-1"]);
    }
}
