// 📤 JSON export - the machine-readable twin of the PDF report
//
// The same document is accepted again as import input, so the schema here
// is also the import schema. Required top-level keys are checked before
// deserializing to give a precise error.

use crate::aggregation::{BalanceInfo, PeriodSummary};
use crate::error::ImportError;
use crate::processor::TransactionRow;
use crate::report::ReportData;
use crate::settings::{Organization, QuarterMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Keys an importable document must carry
pub const REQUIRED_KEYS: &[&str] = &[
    "metadata",
    "organization",
    "balance_info",
    "account_mappings",
    "account_details",
];

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BwaExport {
    pub metadata: ExportMetadata,
    pub organization: Organization,
    pub balance_info: BalanceInfo,
    pub account_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub account_names: BTreeMap<String, String>,
    #[serde(default)]
    pub super_group_mappings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly_summary: Option<SummaryExport>,
    #[serde(default)]
    pub quarterly_summaries: Vec<QuarterExport>,
    pub account_details: Vec<AccountDetailExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub export_date: String,
    pub year: i32,
    #[serde(default)]
    pub quarter_mode: QuarterMode,
    #[serde(default)]
    pub generated_reports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryExport {
    /// super-group → {BWA group → sum}
    pub summary: BTreeMap<String, BTreeMap<String, f64>>,
    pub bwa_groups: BTreeMap<String, f64>,
    pub detailed_accounts: BTreeMap<String, BTreeMap<String, f64>>,
    pub total: f64,
}

impl SummaryExport {
    pub fn from_summary(summary: &PeriodSummary) -> Self {
        SummaryExport {
            summary: summary
                .super_groups
                .iter()
                .map(|(k, groups)| (k.clone(), round_map(groups)))
                .collect(),
            bwa_groups: round_map(&summary.bwa_groups),
            detailed_accounts: summary
                .detailed_accounts
                .iter()
                .map(|(k, accounts)| (k.clone(), round_map(accounts)))
                .collect(),
            total: round2(summary.total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterExport {
    pub quarter: u8,
    #[serde(flatten)]
    pub summary: SummaryExport,
    pub balance_info: BalanceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetailExport {
    #[serde(deserialize_with = "string_or_number")]
    pub account_number: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub transaction_count: usize,
    #[serde(default)]
    pub transactions: Vec<TransactionExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionExport {
    #[serde(default, deserialize_with = "string_or_number")]
    pub booking_number: String,
    /// `YYYY-MM-DD`
    pub booking_date: String,
    #[serde(default)]
    pub purpose: String,
    pub amount: f64,
    #[serde(default)]
    pub quarter: u8,
}

impl TransactionExport {
    fn from_row(row: &TransactionRow) -> Self {
        TransactionExport {
            booking_number: row.booking_number.clone(),
            booking_date: row.booking_date.format("%Y-%m-%d").to_string(),
            purpose: row.purpose.clone(),
            amount: row.amount_clean,
            quarter: row.quarter,
        }
    }
}

/// Exports written by other tools sometimes carry account numbers as JSON
/// numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_map(map: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    map.iter().map(|(k, v)| (k.clone(), round2(*v))).collect()
}

// ============================================================================
// BUILD / WRITE / READ
// ============================================================================

/// Assemble the export document from computed report data
pub fn build_export(data: &ReportData, generated_reports: Vec<String>) -> BwaExport {
    let quarterly_summaries = data
        .quarterly
        .iter()
        .filter_map(|(summary, balance)| {
            summary.period.quarter().map(|quarter| QuarterExport {
                quarter,
                summary: SummaryExport::from_summary(summary),
                balance_info: *balance,
            })
        })
        .collect();

    let account_details = data
        .accounts
        .iter()
        .map(|account| AccountDetailExport {
            account_number: account.account_number.clone(),
            account_name: account.account_name.clone(),
            total: round2(account.total),
            transaction_count: account.transaction_count,
            transactions: data
                .rows
                .iter()
                .filter(|r| r.account_number == account.account_number)
                .map(TransactionExport::from_row)
                .collect(),
        })
        .collect();

    BwaExport {
        metadata: ExportMetadata {
            export_date: data.generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            year: data.year,
            quarter_mode: data.quarter_mode,
            generated_reports,
            source_checksum: data.source_checksum.clone(),
        },
        organization: data.organization.clone(),
        balance_info: data.balance,
        account_mappings: data.mappings.accounts.as_map().clone(),
        account_names: data.mappings.names.as_map().clone(),
        super_group_mappings: data.mappings.super_groups.as_map().clone(),
        yearly_summary: Some(SummaryExport::from_summary(&data.yearly)),
        quarterly_summaries,
        account_details,
    }
}

pub fn write_json(export: &BwaExport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write JSON export: {}", path.display()))?;
    tracing::info!(path = %path.display(), accounts = export.account_details.len(), "JSON export written");
    Ok(())
}

/// Parse and validate an exported document
pub fn parse_export(text: &str) -> Result<BwaExport> {
    let value: serde_json::Value =
        serde_json::from_str(text).context("Failed to parse JSON document")?;

    let missing: Vec<String> = match value.as_object() {
        Some(object) => REQUIRED_KEYS
            .iter()
            .filter(|key| !object.contains_key(**key))
            .map(|key| key.to_string())
            .collect(),
        None => REQUIRED_KEYS.iter().map(|key| key.to_string()).collect(),
    };
    if !missing.is_empty() {
        return Err(ImportError::InvalidJsonSchema { missing }.into());
    }

    let export: BwaExport =
        serde_json::from_value(value).context("JSON document does not match the BWA export schema")?;
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "metadata": {"export_date": "2024-12-31 10:00:00", "year": 2024, "quarter_mode": "cumulative"},
        "organization": {"name": "Verein"},
        "balance_info": {"opening_balance": 100.0, "total_transactions": 550.5, "closing_balance": 650.5},
        "account_mappings": {"4000": "Spenden"},
        "account_details": [
            {"account_number": 4000, "account_name": "Spenden",
             "transactions": [{"booking_number": 17, "booking_date": "2024-01-15", "purpose": "Spende", "amount": 1000.5}]}
        ]
    }"#;

    #[test]
    fn test_parse_minimal_document() {
        let export = parse_export(MINIMAL).unwrap();

        assert_eq!(export.metadata.year, 2024);
        assert_eq!(export.metadata.quarter_mode, QuarterMode::Cumulative);
        assert_eq!(export.organization.name, "Verein");
        assert!(export.super_group_mappings.is_empty());
        assert_eq!(export.account_details[0].account_number, "4000");
        assert_eq!(export.account_details[0].transactions[0].booking_number, "17");
        assert!(export.yearly_summary.is_none());
    }

    #[test]
    fn test_missing_keys_are_listed() {
        let err = parse_export(r#"{"metadata": {}, "organization": {}}"#).unwrap_err();
        match err.downcast_ref::<ImportError>() {
            Some(ImportError::InvalidJsonSchema { missing }) => {
                assert_eq!(missing, &vec!["balance_info", "account_mappings", "account_details"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(parse_export("[1, 2, 3]").is_err());
        assert!(parse_export("not json").is_err());
    }

    #[test]
    fn test_quarter_export_flattens_summary() {
        let quarter = QuarterExport {
            quarter: 2,
            summary: SummaryExport {
                total: 12.5,
                ..Default::default()
            },
            balance_info: BalanceInfo::compute(0.0, 12.5),
        };
        let value = serde_json::to_value(&quarter).unwrap();
        assert_eq!(value["quarter"], 2);
        assert_eq!(value["total"], 12.5);
        assert!(value.get("summary").unwrap().is_object());
        assert_eq!(value["balance_info"]["closing_balance"], 12.5);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(-450.004), -450.0);
    }
}
