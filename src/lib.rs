// BWA Report - Core Library
// Exposes all modules for use in the CLI, the TUI and tests

pub mod error;
pub mod settings;       // Settings snapshot + store trait
pub mod db;             // SQLite settings store + audit log
pub mod normalize;      // Amounts, dates, account numbers
pub mod file_handler;   // CSV / XLSX / XLS / ODS → Table
pub mod data_quality;   // Import report
pub mod mappings;       // Account → BWA group → super-group
pub mod processor;      // Table / JSON → TransactionRow
pub mod aggregation;    // Period summaries + balance
pub mod reconciliation; // Totals and drift checks
pub mod export;         // JSON export schema
pub mod labels;         // German / English texts
pub mod chart;          // Bar chart layout
pub mod pdf;            // PDF rendering
pub mod report;         // End-to-end generation

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use error::{ImportError, RowError, SettingsError};
pub use settings::{
    DecimalFormat, Language, MemoryStore, Organization, QuarterMode, ReportSections, Settings,
    SettingsStore,
};
pub use db::{AuditEntry, AuditKind, SqliteStore};
pub use file_handler::{FileFormat, FileHandler, Table};
pub use data_quality::{ImportReport, RejectedRow};
pub use mappings::{AccountMappings, AccountNames, MappingSet, SuperGroupMappings, UNASSIGNED};
pub use processor::{ColumnMapping, CsvProcessor, JsonOrigin, TransactionRow};
pub use aggregation::{
    aggregate, account_totals, AccountTotal, BalanceInfo, Period, PeriodSummary,
};
pub use reconciliation::{
    Discrepancy, DiscrepancyCategory, ReconciliationEngine, ReconciliationReport,
    ReconciliationResult,
};
pub use export::{BwaExport, parse_export, write_json};
pub use pdf::BwaPdfGenerator;
pub use report::{
    build_report_data, export_json, generate_bwa_report, resolve_config, ReportConfig,
    ReportData, ReportOutcome, ReportRequest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
