// ✅ Import quality report - what was read, what was rejected and why
//
// Every import produces an `ImportReport`. Rows that fail validation are
// never dropped silently: they are listed here with their source line and
// the typed reason.

use crate::error::RowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// REJECTED ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// Source line (CSV) or sheet row (spreadsheets), 1-based
    pub line: usize,
    pub kind: String,
    pub message: String,
}

impl RejectedRow {
    pub fn new(line: usize, error: &RowError) -> Self {
        RejectedRow {
            line,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

// ============================================================================
// IMPORT REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub source_file: String,
    pub format: String,
    /// SHA-256 of the raw file bytes
    pub checksum: String,
    pub total_rows: usize,
    pub imported: usize,
    pub rejected: Vec<RejectedRow>,
    pub imported_at: DateTime<Utc>,
}

impl ImportReport {
    pub fn new(source_file: &str, format: &str, checksum: String) -> Self {
        ImportReport {
            source_file: source_file.to_string(),
            format: format.to_string(),
            checksum,
            total_rows: 0,
            imported: 0,
            rejected: Vec::new(),
            imported_at: Utc::now(),
        }
    }

    pub fn record_imported(&mut self) {
        self.total_rows += 1;
        self.imported += 1;
    }

    pub fn record_rejected(&mut self, line: usize, error: &RowError) {
        self.total_rows += 1;
        tracing::warn!(line, reason = %error, "row rejected");
        self.rejected.push(RejectedRow::new(line, error));
    }

    /// Share of rows that made it into the data set (1.0 for an empty file)
    pub fn quality(&self) -> f64 {
        if self.total_rows == 0 {
            1.0
        } else {
            self.imported as f64 / self.total_rows as f64
        }
    }

    /// Rejections grouped by `RowError::kind`
    pub fn rejection_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rejected {
            *counts.entry(row.kind.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{}: {} of {} rows imported ({:.1}%)",
            self.source_file,
            self.imported,
            self.total_rows,
            self.quality() * 100.0
        );

        let counts = self.rejection_counts();
        if !counts.is_empty() {
            let parts: Vec<String> = counts
                .iter()
                .map(|(kind, count)| format!("{} {}", count, kind))
                .collect();
            text.push_str(&format!(" | rejected: {}", parts.join(", ")));
        }
        text
    }
}

/// Hex SHA-256 fingerprint of an input file
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_quality() {
        let mut report = ImportReport::new("buchungen.csv", "CSV", checksum(b"x"));
        report.record_imported();
        report.record_imported();
        report.record_imported();
        report.record_rejected(5, &RowError::InvalidDate("gestern".to_string()));

        assert_eq!(report.total_rows, 4);
        assert_eq!(report.imported, 3);
        assert!((report.quality() - 0.75).abs() < 1e-9);
        assert_eq!(report.rejected[0].line, 5);
        assert_eq!(report.rejected[0].kind, "invalid_date");
        assert!(report.rejected[0].message.contains("gestern"));
    }

    #[test]
    fn test_summary_groups_rejections() {
        let mut report = ImportReport::new("b.csv", "CSV", String::new());
        report.record_imported();
        report.record_rejected(2, &RowError::MissingAccount);
        report.record_rejected(3, &RowError::MissingAccount);
        report.record_rejected(4, &RowError::InvalidAmount("x".to_string()));

        let counts = report.rejection_counts();
        assert_eq!(counts["missing_account"], 2);
        assert_eq!(counts["invalid_amount"], 1);

        let summary = report.summary();
        assert!(summary.contains("1 of 4 rows imported"));
        assert!(summary.contains("2 missing_account"));
        println!("✅ {}", summary);
    }

    #[test]
    fn test_empty_report_is_full_quality() {
        let report = ImportReport::new("leer.csv", "CSV", String::new());
        assert_eq!(report.quality(), 1.0);
        assert!(!report.has_rejections());
    }

    #[test]
    fn test_checksum_is_stable_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
