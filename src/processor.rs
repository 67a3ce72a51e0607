// 🏗️ Processor - turn an export file into validated transaction rows
//
// Two input paths produce the same row shape:
//   - tabular files (CSV / XLSX / XLS / ODS) through `FileHandler`
//   - a previously written JSON export, whose embedded organization,
//     balance and mapping tables are kept as the "JSON origin"

use crate::aggregation::BalanceInfo;
use crate::data_quality::{checksum, ImportReport};
use crate::error::{ImportError, RowError};
use crate::export::{parse_export, BwaExport, ExportMetadata};
use crate::file_handler::{Cell, FileFormat, FileHandler, Table};
use crate::mappings::{AccountMappings, AccountNames, SuperGroupMappings};
use crate::normalize::{
    clean_amount, normalize_account_number, normalize_account_str, parse_date, parse_date_str,
    quarter_of,
};
use crate::settings::{DecimalFormat, Organization, QuarterMode, Settings};
use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// COLUMNS
// ============================================================================

pub const ACCOUNT_COLUMN: &str = "Sachkontonr.";
pub const AMOUNT_COLUMN: &str = "Betrag";
pub const DATE_COLUMN: &str = "Buchungstag";

const ACCOUNT_NAME_COLUMNS: &[&str] = &[
    "Sachkonto",
    "Sachkontobezeichnung",
    "Kontobezeichnung",
    "Kontoname",
];
const BOOKING_NUMBER_COLUMNS: &[&str] = &[
    "Buchungsnr.",
    "Buchungsnummer",
    "Belegnummer",
    "Belegnr.",
    "Beleg",
];
const PURPOSE_COLUMNS: &[&str] = &["Verwendungszweck", "Buchungstext", "Text"];

/// Column indices, resolved once per table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub account: usize,
    pub amount: usize,
    pub date: usize,
    pub account_name: Option<usize>,
    pub booking_number: Option<usize>,
    pub purpose: Option<usize>,
}

impl ColumnMapping {
    /// Locate every column; fails with all missing required columns at once
    pub fn resolve(headers: &[String]) -> Result<Self, ImportError> {
        let account = find_column(headers, &[ACCOUNT_COLUMN]);
        let amount = find_column(headers, &[AMOUNT_COLUMN]);
        let date = find_column(headers, &[DATE_COLUMN]);

        match (account, amount, date) {
            (Some(account), Some(amount), Some(date)) => Ok(ColumnMapping {
                account,
                amount,
                date,
                account_name: find_column(headers, ACCOUNT_NAME_COLUMNS),
                booking_number: find_column(headers, BOOKING_NUMBER_COLUMNS),
                purpose: find_column(headers, PURPOSE_COLUMNS),
            }),
            _ => {
                let missing = [
                    (account, ACCOUNT_COLUMN),
                    (amount, AMOUNT_COLUMN),
                    (date, DATE_COLUMN),
                ]
                .iter()
                .filter(|(index, _)| index.is_none())
                .map(|(_, name)| name.to_string())
                .collect();

                Err(ImportError::MissingColumns {
                    missing,
                    found: headers.to_vec(),
                })
            }
        }
    }
}

/// Exact header match first, then case-insensitive; candidates in priority order
fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|c| headers.iter().position(|h| h.trim() == *c))
        .or_else(|| {
            candidates.iter().find_map(|c| {
                let wanted = c.to_lowercase();
                headers.iter().position(|h| h.trim().to_lowercase() == wanted)
            })
        })
}

// ============================================================================
// TRANSACTION ROW
// ============================================================================

/// One validated booking line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Source line for diagnostics
    pub line: usize,
    pub booking_number: String,
    /// Normalized, never empty
    pub account_number: String,
    pub account_name: String,
    pub booking_date: NaiveDate,
    pub purpose: String,
    /// Amount as it appeared in the file
    pub amount: String,
    pub amount_clean: f64,
    /// 1..=4
    pub quarter: u8,
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Validate one table row
pub fn parse_row(
    line: usize,
    cells: &[Cell],
    columns: &ColumnMapping,
    format: DecimalFormat,
) -> Result<TransactionRow, RowError> {
    let cell = |index: usize| cells.get(index).unwrap_or(&EMPTY_CELL);
    let optional_text = |index: Option<usize>| index.map(|i| cell(i).as_text()).unwrap_or_default();

    let account_number =
        normalize_account_number(cell(columns.account)).ok_or(RowError::MissingAccount)?;

    let date_cell = cell(columns.date);
    let booking_date =
        parse_date(date_cell).ok_or_else(|| RowError::InvalidDate(date_cell.as_text()))?;

    let amount_cell = cell(columns.amount);
    let amount_clean = clean_amount(amount_cell, format)
        .ok_or_else(|| RowError::InvalidAmount(amount_cell.as_text()))?;

    Ok(TransactionRow {
        line,
        booking_number: optional_text(columns.booking_number),
        account_number,
        account_name: optional_text(columns.account_name),
        booking_date,
        purpose: optional_text(columns.purpose),
        amount: amount_cell.as_text(),
        amount_clean,
        quarter: quarter_of(booking_date),
    })
}

// ============================================================================
// JSON ORIGIN
// ============================================================================

/// Context carried by a re-imported JSON export
#[derive(Debug, Clone, PartialEq)]
pub struct JsonOrigin {
    pub metadata: ExportMetadata,
    pub organization: Organization,
    pub balance_info: BalanceInfo,
    pub account_mappings: AccountMappings,
    pub account_names: AccountNames,
    pub super_group_mappings: SuperGroupMappings,
}

// ============================================================================
// PROCESSOR
// ============================================================================

pub struct CsvProcessor {
    decimal_format: DecimalFormat,
    delimiter: Option<u8>,
    rows: Vec<TransactionRow>,
    account_names: AccountNames,
    json_origin: Option<JsonOrigin>,
    report: Option<ImportReport>,
}

impl CsvProcessor {
    pub fn new(settings: &Settings) -> Self {
        Self::with_options(settings.decimal_format, Some(settings.csv_delimiter_byte()))
    }

    pub fn with_options(decimal_format: DecimalFormat, delimiter: Option<u8>) -> Self {
        CsvProcessor {
            decimal_format,
            delimiter,
            rows: Vec::new(),
            account_names: AccountNames::new(),
            json_origin: None,
            report: None,
        }
    }

    /// Load a file, replacing any previously loaded data
    ///
    /// # Arguments
    /// * `path` - tabular export or JSON export
    /// * `sheet_name` - workbook sheet (spreadsheets only)
    pub fn load_file(&mut self, path: &Path, sheet_name: Option<&str>) -> Result<&ImportReport> {
        let format = FileFormat::from_path(path)?;
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let report = ImportReport::new(&source, format.name(), checksum(&bytes));

        match format {
            FileFormat::Json => {
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("JSON export is not valid UTF-8: {}", path.display()))?;
                let export = parse_export(&text)
                    .with_context(|| format!("Failed to import JSON export: {}", path.display()))?;
                self.load_export(export, report)
            }
            _ => {
                let table = FileHandler::new(self.delimiter).read_table(path, sheet_name)?;
                self.load_table(&table, report)
            }
        }
    }

    /// Validate every row of a table
    pub fn load_table(&mut self, table: &Table, mut report: ImportReport) -> Result<&ImportReport> {
        let columns = ColumnMapping::resolve(&table.headers)?;
        tracing::debug!(?columns, "resolved columns");

        self.reset();
        for row in &table.rows {
            match parse_row(row.line, &row.cells, &columns, self.decimal_format) {
                Ok(transaction) => {
                    self.account_names
                        .set(&transaction.account_number, &transaction.account_name);
                    self.rows.push(transaction);
                    report.record_imported();
                }
                Err(err) => report.record_rejected(row.line, &err),
            }
        }

        tracing::info!("{}", report.summary());
        Ok(&*self.report.insert(report))
    }

    /// Flatten `account_details[].transactions[]` of a JSON export
    pub fn load_export(&mut self, export: BwaExport, mut report: ImportReport) -> Result<&ImportReport> {
        self.reset();

        let mut line = 0;
        for account in &export.account_details {
            let account_number = normalize_account_str(&account.account_number);

            for tx in &account.transactions {
                line += 1;
                if account_number.is_empty() {
                    report.record_rejected(line, &RowError::MissingAccount);
                    continue;
                }
                if !tx.amount.is_finite() {
                    report.record_rejected(line, &RowError::InvalidAmount(tx.amount.to_string()));
                    continue;
                }
                let Some(booking_date) = parse_date_str(&tx.booking_date) else {
                    report.record_rejected(line, &RowError::InvalidDate(tx.booking_date.clone()));
                    continue;
                };

                self.rows.push(TransactionRow {
                    line,
                    booking_number: tx.booking_number.clone(),
                    account_number: account_number.clone(),
                    account_name: account.account_name.clone(),
                    booking_date,
                    purpose: tx.purpose.clone(),
                    amount: tx.amount.to_string(),
                    amount_clean: tx.amount,
                    quarter: quarter_of(booking_date),
                });
                report.record_imported();
            }

            self.account_names.set(&account_number, &account.account_name);
        }

        let account_names = AccountNames::from(export.account_names);
        self.account_names.merge(&account_names);

        self.json_origin = Some(JsonOrigin {
            metadata: export.metadata,
            organization: export.organization,
            balance_info: export.balance_info,
            account_mappings: AccountMappings::from(export.account_mappings),
            account_names,
            super_group_mappings: SuperGroupMappings::from(export.super_group_mappings),
        });

        tracing::info!("{}", report.summary());
        Ok(&*self.report.insert(report))
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.account_names = AccountNames::new();
        self.json_origin = None;
        self.report = None;
    }

    pub fn rows(&self) -> &[TransactionRow] {
        &self.rows
    }

    /// Rows of quarter `n`, or of quarters 1..=n in cumulative mode
    pub fn get_data_by_quarter(&self, quarter: u8, mode: QuarterMode) -> Vec<&TransactionRow> {
        if !(1..=4).contains(&quarter) {
            return Vec::new();
        }
        self.rows
            .iter()
            .filter(|r| match mode {
                QuarterMode::Individual => r.quarter == quarter,
                QuarterMode::Cumulative => r.quarter <= quarter,
            })
            .collect()
    }

    /// Fiscal year of the data: the JSON metadata year, else the most
    /// frequent booking year, else the current year
    pub fn year(&self) -> i32 {
        if let Some(origin) = &self.json_origin {
            return origin.metadata.year;
        }

        let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.booking_date.year()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(year, count)| (*count, *year))
            .map(|(year, _)| year)
            .unwrap_or_else(|| Local::now().year())
    }

    /// Names seen in the import, by normalized account number
    pub fn account_names(&self) -> &AccountNames {
        &self.account_names
    }

    pub fn json_origin(&self) -> Option<&JsonOrigin> {
        self.json_origin.as_ref()
    }

    pub fn is_json_origin(&self) -> bool {
        self.json_origin.is_some()
    }

    pub fn import_report(&self) -> Option<&ImportReport> {
        self.report.as_ref()
    }

    pub fn total_amount(&self) -> f64 {
        self.rows.iter().map(|r| r.amount_clean).sum()
    }

    pub fn decimal_format(&self) -> DecimalFormat {
        self.decimal_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_handler::TableRow;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn text(s: &str) -> Cell {
        Cell::text(s)
    }

    fn processor() -> CsvProcessor {
        CsvProcessor::with_options(DecimalFormat::German, Some(b';'))
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolve_columns_exact_and_case_insensitive() {
        let cols = ColumnMapping::resolve(&headers(&[
            "buchungstag",
            "Sachkontonr.",
            "BETRAG",
            "Kontoname",
            "Belegnr.",
            "Buchungstext",
        ]))
        .unwrap();

        assert_eq!(cols.account, 1);
        assert_eq!(cols.amount, 2);
        assert_eq!(cols.date, 0);
        assert_eq!(cols.account_name, Some(3));
        assert_eq!(cols.booking_number, Some(4));
        assert_eq!(cols.purpose, Some(5));
    }

    #[test]
    fn test_optional_columns_follow_priority_order() {
        let cols = ColumnMapping::resolve(&headers(&[
            "Sachkontonr.",
            "Betrag",
            "Buchungstag",
            "Text",
            "Verwendungszweck",
            "Kontobezeichnung",
            "Sachkonto",
        ]))
        .unwrap();
        assert_eq!(cols.purpose, Some(4));
        assert_eq!(cols.account_name, Some(6));
        assert_eq!(cols.booking_number, None);
    }

    #[test]
    fn test_missing_columns_are_all_named() {
        let err = ColumnMapping::resolve(&headers(&["Konto", "Betrag"])).unwrap_err();
        assert_eq!(
            err,
            ImportError::MissingColumns {
                missing: vec!["Sachkontonr.".to_string(), "Buchungstag".to_string()],
                found: vec!["Konto".to_string(), "Betrag".to_string()],
            }
        );
    }

    #[test]
    fn test_rejected_rows_are_reported_not_dropped() {
        let table = Table {
            headers: headers(&["Sachkontonr.", "Betrag", "Buchungstag"]),
            rows: vec![
                TableRow { line: 2, cells: vec![text("4000"), text("1.000,50"), text("15.01.2024")] },
                TableRow { line: 3, cells: vec![text(""), text("5,00"), text("15.01.2024")] },
                TableRow { line: 4, cells: vec![text("4000"), text("abc"), text("15.01.2024")] },
                TableRow { line: 5, cells: vec![text("4000"), text("5,00"), text("gestern")] },
                TableRow { line: 6, cells: vec![text("6000")] },
            ],
        };

        let mut p = processor();
        let report = p
            .load_table(&table, ImportReport::new("t.csv", "CSV", String::new()))
            .unwrap()
            .clone();

        assert_eq!(report.imported, 1);
        assert_eq!(report.total_rows, 5);
        let kinds: Vec<&str> = report.rejected.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["missing_account", "invalid_amount", "invalid_date", "invalid_date"]);
        assert_eq!(report.rejected[0].line, 3);
        assert_eq!(p.rows()[0].amount_clean, 1000.5);
        assert_eq!(p.rows()[0].amount, "1.000,50");
    }

    #[test]
    fn test_numeric_and_date_cells_from_spreadsheets() {
        let cols = ColumnMapping::resolve(&headers(&["Sachkontonr.", "Betrag", "Buchungstag"])).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let row = parse_row(
            7,
            &[Cell::Number(4000.0), Cell::Number(1234.56), Cell::Date(date)],
            &cols,
            DecimalFormat::German,
        )
        .unwrap();

        assert_eq!(row.account_number, "4000");
        assert_eq!(row.amount_clean, 1234.56);
        assert_eq!(row.booking_date, date);
        assert_eq!(row.quarter, 2);
        assert_eq!(row.line, 7);
    }

    #[test]
    fn test_load_csv_file_and_quarter_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "buchungen.csv",
            "Sachkontonr.;Sachkonto;Betrag;Buchungstag;Verwendungszweck\n\
             4000;Spenden;1000,50;15.01.2024;Spende Müller\n\
             6000;Miete;-450,00;01.02.2024;Miete Februar\n\
             6000;Miete;-450,00;01.05.2024;Miete Mai\n\
             4000;Spenden;80,00;10.10.2023;Nachzügler\n",
        );

        let mut p = processor();
        let report = p.load_file(&path, None).unwrap();
        assert_eq!(report.imported, 4);
        assert_eq!(report.source_file, "buchungen.csv");
        assert_eq!(report.checksum.len(), 64);

        assert_eq!(p.get_data_by_quarter(1, QuarterMode::Individual).len(), 2);
        assert_eq!(p.get_data_by_quarter(2, QuarterMode::Individual).len(), 1);
        assert_eq!(p.get_data_by_quarter(2, QuarterMode::Cumulative).len(), 3);
        assert_eq!(p.get_data_by_quarter(4, QuarterMode::Cumulative).len(), 4);
        assert!(p.get_data_by_quarter(0, QuarterMode::Cumulative).is_empty());
        assert!(p.get_data_by_quarter(5, QuarterMode::Individual).is_empty());

        assert_eq!(p.year(), 2024);
        assert_eq!(p.account_names().get("6000"), Some("Miete"));
        assert_eq!(p.rows()[0].purpose, "Spende Müller");
        assert!(!p.is_json_origin());
        assert!((p.total_amount() - 180.5).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_row_points_at_file_line_after_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "luecken.csv",
            "Sachkontonr.;Betrag;Buchungstag\n\
             4000;10,00;15.01.2024\n\
             \n\
             \n\
             4000;zehn;16.01.2024\n",
        );

        let mut p = processor();
        let report = p.load_file(&path, None).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 5);
        assert_eq!(p.rows()[0].line, 2);
    }

    #[test]
    fn test_load_workbook_sheet() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buchungen.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name("Leer").unwrap();
        let sheet = workbook.add_worksheet();
        sheet.set_name("2024").unwrap();
        for (col, header) in ["Sachkontonr.", "Sachkonto", "Betrag", "Buchungstag"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_number(1, 0, 4000).unwrap();
        sheet.write_string(1, 1, "Spenden").unwrap();
        sheet.write_number(1, 2, 1000.5).unwrap();
        sheet.write_number(1, 3, 45306).unwrap();
        sheet.write_number(2, 0, 6000).unwrap();
        sheet.write_string(2, 1, "Miete").unwrap();
        sheet.write_string(2, 2, "abc").unwrap();
        sheet.write_string(2, 3, "01.02.2024").unwrap();
        workbook.save(&path).unwrap();

        let mut p = processor();
        let report = p.load_file(&path, Some("2024")).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 3);

        let row = &p.rows()[0];
        assert_eq!(row.account_number, "4000");
        assert_eq!(row.amount_clean, 1000.5);
        assert_eq!(row.booking_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(row.line, 2);
        assert_eq!(p.account_names().get("4000"), Some("Spenden"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "report.pdf", "%PDF");
        let err = processor().load_file(&path, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ImportError>(),
            Some(&ImportError::UnsupportedFormat("pdf".to_string()))
        );
    }

    #[test]
    fn test_json_import_keeps_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "bwa_2023.json",
            r#"{
                "metadata": {"export_date": "2024-01-05 09:00:00", "year": 2023, "quarter_mode": "individual", "generated_reports": ["pdf"]},
                "organization": {"name": "Sportverein", "city": "Ulm"},
                "balance_info": {"opening_balance": 200.0, "total_transactions": 550.5, "closing_balance": 750.5},
                "account_mappings": {"4000": "Spenden", "6000": "Miete"},
                "account_names": {"4000": "Spendenkonto"},
                "super_group_mappings": {"Spenden": "Einnahmen", "Miete": "Ausgaben"},
                "account_details": [
                    {"account_number": "4000", "account_name": "Spenden", "total": 1000.5, "transaction_count": 1,
                     "transactions": [{"booking_number": "1", "booking_date": "2023-01-15", "purpose": "Spende", "amount": 1000.5, "quarter": 1}]},
                    {"account_number": "6000", "account_name": "Miete", "total": -450.0, "transaction_count": 2,
                     "transactions": [
                        {"booking_number": "2", "booking_date": "2023-02-01", "purpose": "Miete", "amount": -450.0, "quarter": 1},
                        {"booking_number": "3", "booking_date": "kaputt", "purpose": "Miete", "amount": -1.0, "quarter": 1}
                     ]}
                ]
            }"#,
        );

        let mut p = processor();
        let report = p.load_file(&path, None).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.rejected.len(), 1);

        let origin = p.json_origin().unwrap();
        assert_eq!(origin.organization.name, "Sportverein");
        assert_eq!(origin.balance_info.opening_balance, 200.0);
        assert_eq!(origin.account_mappings.get("6000"), Some("Miete"));
        assert_eq!(origin.super_group_mappings.super_group_for("Spenden"), "Einnahmen");
        assert_eq!(p.year(), 2023);
        assert_eq!(p.account_names().get("4000"), Some("Spendenkonto"));
        assert!((p.total_amount() - 550.5).abs() < 1e-9);
    }

    #[test]
    fn test_loading_again_replaces_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(&dir, "a.csv", "Sachkontonr.;Betrag;Buchungstag\n4000;1;01.01.2024\n4000;2;01.01.2024\n");
        let second = write(&dir, "b.csv", "Sachkontonr.;Betrag;Buchungstag\n6000;3;01.01.2024\n");

        let mut p = processor();
        p.load_file(&first, None).unwrap();
        p.load_file(&second, None).unwrap();
        assert_eq!(p.rows().len(), 1);
        assert_eq!(p.rows()[0].account_number, "6000");
    }
}
