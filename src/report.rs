// 🧾 Report generation - snapshot configuration, aggregate, render, export
//
// Entry point behind `bwa-report generate`. Configuration is resolved once
// per run into a `ReportConfig`; every section of one report therefore sees
// the same quarter mode and mapping tables.

use crate::aggregation::{
    account_totals, aggregate, quarters_present, AccountTotal, BalanceInfo, Period, PeriodSummary,
};
use crate::export::{build_export, write_json, BwaExport};
use crate::mappings::{AccountMappings, MappingSet};
use crate::pdf::BwaPdfGenerator;
use crate::processor::{CsvProcessor, TransactionRow};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::settings::{Organization, QuarterMode, Settings, SettingsStore};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// CONFIGURATION SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportConfig {
    pub settings: Settings,
    pub mappings: MappingSet,
    /// Stored account mappings, kept when `resolve_config` swaps in
    /// another set; `None` means `mappings.accounts` is the stored one
    pub persisted_accounts: Option<AccountMappings>,
}

impl ReportConfig {
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        Ok(ReportConfig {
            settings: Settings::load(store)?,
            mappings: MappingSet::load(store)?,
            persisted_accounts: None,
        })
    }

    /// Account mappings as stored, before any per-run override
    pub fn persisted_accounts(&self) -> &AccountMappings {
        self.persisted_accounts
            .as_ref()
            .unwrap_or(&self.mappings.accounts)
    }
}

/// Apply the data's own context on top of the persisted configuration
///
/// Account mappings: caller-provided, else embedded in a JSON import, else
/// persisted. A JSON import also overrides organization, opening balance and
/// super-group mappings. The overrides live only in the returned snapshot;
/// nothing is written back.
pub fn resolve_config(
    base: &ReportConfig,
    processor: &CsvProcessor,
    account_mappings: Option<&AccountMappings>,
) -> ReportConfig {
    let mut config = base.clone();
    config.persisted_accounts = Some(base.persisted_accounts().clone());

    config.mappings.names.merge(processor.account_names());
    for (account, name) in base.mappings.names.iter() {
        config.mappings.names.set(account, name);
    }

    if let Some(origin) = processor.json_origin() {
        tracing::debug!("applying JSON origin overrides");
        config.settings.organization = origin.organization.clone();
        config.settings.opening_balance = origin.balance_info.opening_balance;
        config.mappings.super_groups = origin.super_group_mappings.clone();
        config.mappings.names.merge(&origin.account_names);
        if !origin.account_mappings.is_empty() {
            config.mappings.accounts = origin.account_mappings.clone();
        }
    }

    if let Some(accounts) = account_mappings {
        config.mappings.accounts = accounts.clone();
    }

    config
}

// ============================================================================
// REPORT DATA
// ============================================================================

/// Everything a renderer needs, computed once
#[derive(Debug, Clone)]
pub struct ReportData {
    pub year: i32,
    pub quarter_mode: QuarterMode,
    pub organization: Organization,
    pub mappings: MappingSet,
    pub rows: Vec<TransactionRow>,
    /// One entry per quarter with data
    pub quarterly: Vec<(PeriodSummary, BalanceInfo)>,
    pub yearly: PeriodSummary,
    pub accounts: Vec<AccountTotal>,
    pub balance: BalanceInfo,
    pub source_checksum: Option<String>,
    pub generated_at: DateTime<Local>,
    pub reconciliation: ReconciliationReport,
}

pub fn build_report_data(processor: &CsvProcessor, config: &ReportConfig) -> ReportData {
    let rows = processor.rows().to_vec();
    let settings = &config.settings;
    let mappings = &config.mappings;
    let mode = settings.quarter_mode;
    let opening = settings.opening_balance;

    let quarterly = quarters_present(&rows)
        .into_iter()
        .map(|q| {
            let period = Period::for_quarter(q, mode);
            (
                aggregate(&rows, period, mappings),
                BalanceInfo::for_period(&rows, period, opening),
            )
        })
        .collect();

    let yearly = aggregate(&rows, Period::Year, mappings);
    let balance = BalanceInfo::for_period(&rows, Period::Year, opening);

    let engine = ReconciliationEngine::new();
    let mut reconciliation = engine.reconcile(&rows, &yearly, mappings);
    if let Some(origin) = processor.json_origin() {
        reconciliation.add(
            engine.check_mapping_drift(&origin.account_mappings, config.persisted_accounts()),
        );
        reconciliation.add(engine.check_balance(&origin.balance_info, &balance));
    }

    ReportData {
        year: processor.year(),
        quarter_mode: mode,
        organization: settings.organization.clone(),
        mappings: mappings.clone(),
        accounts: account_totals(&rows, mappings),
        rows,
        quarterly,
        yearly,
        balance,
        source_checksum: processor.import_report().map(|r| r.checksum.clone()),
        generated_at: Local::now(),
        reconciliation,
    }
}

// ============================================================================
// GENERATION
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub output: PathBuf,
    /// Overrides persisted and embedded account mappings
    pub account_mappings: Option<AccountMappings>,
    /// Overrides the `export_json` setting
    pub export_json: Option<bool>,
}

impl ReportRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        ReportRequest {
            output: output.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub pdf_path: PathBuf,
    pub json_path: Option<PathBuf>,
    pub pages: usize,
    pub total: f64,
    pub reconciliation: ReconciliationReport,
}

/// Render the BWA PDF (and the JSON sibling when enabled)
pub fn generate_bwa_report(
    processor: &CsvProcessor,
    base: &ReportConfig,
    request: &ReportRequest,
) -> Result<ReportOutcome> {
    if processor.rows().is_empty() {
        return Err(anyhow!("No transactions loaded, nothing to report"));
    }

    let config = resolve_config(base, processor, request.account_mappings.as_ref());
    let data = build_report_data(processor, &config);
    data.reconciliation.log();
    tracing::info!("{}", data.reconciliation.summary());

    let pages = match BwaPdfGenerator::new(&data, &config.settings)
        .and_then(|generator| generator.render(&request.output))
    {
        Ok(pages) => pages,
        Err(err) => {
            remove_partial(&request.output);
            return Err(err.context(format!(
                "Failed to generate BWA report: {}",
                request.output.display()
            )));
        }
    };
    tracing::info!(path = %request.output.display(), pages, "BWA PDF written");

    let json_path = if request
        .export_json
        .unwrap_or(config.settings.sections.export_json)
    {
        let path = request.output.with_extension("json");
        let export = build_export(&data, vec!["pdf".to_string(), "json".to_string()]);
        write_json(&export, &path)?;
        Some(path)
    } else {
        None
    };

    Ok(ReportOutcome {
        pdf_path: request.output.clone(),
        json_path,
        pages,
        total: data.yearly.total,
        reconciliation: data.reconciliation,
    })
}

/// Write only the JSON export
pub fn export_json(
    processor: &CsvProcessor,
    base: &ReportConfig,
    output: &Path,
    account_mappings: Option<&AccountMappings>,
) -> Result<BwaExport> {
    if processor.rows().is_empty() {
        return Err(anyhow!("No transactions loaded, nothing to export"));
    }

    let config = resolve_config(base, processor, account_mappings);
    let data = build_report_data(processor, &config);
    let export = build_export(&data, vec!["json".to_string()]);
    write_json(&export, output).context("JSON export failed")?;
    Ok(export)
}

fn remove_partial(path: &Path) {
    if path.exists() {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed partial PDF"),
            Err(err) => tracing::warn!(path = %path.display(), %err, "could not remove partial PDF"),
        }
    }
}
