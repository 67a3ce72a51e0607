use anyhow::{Context, Result};
use bwa_report::{
    export_json, generate_bwa_report, CsvProcessor, MappingSet, QuarterMode, ReportConfig,
    ReportRequest, Settings, SqliteStore,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bwa-report", version, about = "BWA reports (PDF / JSON) from booking exports.")]
struct Cli {
    /// Settings database (default: <data dir>/bwa-report/settings.db)
    #[arg(long, env = "BWA_REPORT_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a file and print the import report.
    Import {
        /// CSV, XLSX, XLS, ODS or a previous JSON export
        file: PathBuf,
        /// Workbook sheet (default: first)
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Generate the BWA PDF.
    Generate {
        file: PathBuf,
        /// Output PDF
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
        /// Also write the JSON export next to the PDF
        #[arg(long, conflicts_with = "no_json")]
        json: bool,
        #[arg(long)]
        no_json: bool,
        /// individual | cumulative (default: setting)
        #[arg(long)]
        quarter_mode: Option<QuarterMode>,
    },
    /// Write only the JSON export.
    ExportJson {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
    },
    /// List accounts without a BWA group.
    Unmapped {
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Account → BWA group mappings.
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
    /// BWA group → super-group mappings.
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
    /// Show or change settings.
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Browse a file interactively.
    Tui {
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
    },
}

#[derive(Subcommand)]
enum MapCommands {
    /// Assign an account to a BWA group.
    Set { account: String, group: String },
    /// Remove an account mapping.
    Remove { account: String },
    /// List all account mappings.
    List,
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Assign a BWA group to a super-group.
    Set { group: String, super_group: String },
    /// Remove a super-group mapping.
    Remove { group: String },
    /// List all super-group mappings.
    List,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print every setting.
    Show,
    /// Change one setting, e.g. `settings set quarter_mode cumulative`.
    Set { key: String, value: String },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bwa_report=info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(SqliteStore::default_path);
    let mut store = SqliteStore::open(&db_path)?;

    match cli.command {
        Commands::Import { file, sheet } => run_import(&mut store, &file, sheet.as_deref()),
        Commands::Generate {
            file,
            output,
            sheet,
            json,
            no_json,
            quarter_mode,
        } => {
            let export_json = match (json, no_json) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            run_generate(&store, &file, sheet.as_deref(), output, export_json, quarter_mode)
        }
        Commands::ExportJson { file, output, sheet } => {
            run_export_json(&store, &file, sheet.as_deref(), &output)
        }
        Commands::Unmapped { file, sheet } => run_unmapped(&store, &file, sheet.as_deref()),
        Commands::Map { command } => run_map(&mut store, command),
        Commands::Group { command } => run_group(&mut store, command),
        Commands::Settings { command } => run_settings(&mut store, command),
        Commands::Tui { file, sheet } => run_tui(&store, &file, sheet.as_deref()),
    }
}

fn load(settings: &Settings, file: &Path, sheet: Option<&str>) -> Result<CsvProcessor> {
    let mut processor = CsvProcessor::new(settings);
    processor.load_file(file, sheet)?;
    Ok(processor)
}

fn run_import(store: &mut SqliteStore, file: &Path, sheet: Option<&str>) -> Result<()> {
    let settings = Settings::load(&*store)?;
    let processor = load(&settings, file, sheet)?;

    if let Some(report) = processor.import_report() {
        println!("📂 {}", report.summary());
        println!("   Checksum: {}", report.checksum);
        for rejected in &report.rejected {
            println!("   ✗ line {}: {}", rejected.line, rejected.message);
        }
    }
    println!("   Year: {}  Total: {:.2}", processor.year(), processor.total_amount());

    // Names seen in the file fill gaps in the stored names
    let mut mappings = MappingSet::load(&*store)?;
    let before = mappings.names.len();
    let mut names = processor.account_names().clone();
    names.merge(&mappings.names);
    mappings.names = names;
    if mappings.names.len() != before {
        mappings.save(store)?;
        println!("   Learned {} account names", mappings.names.len() - before);
    }

    let unmapped = mappings.unmapped_accounts(processor.rows());
    if !unmapped.is_empty() {
        println!("⚠️  {} unmapped accounts: {}", unmapped.len(), unmapped.join(", "));
    }
    Ok(())
}

fn run_generate(
    store: &SqliteStore,
    file: &Path,
    sheet: Option<&str>,
    output: PathBuf,
    export_json: Option<bool>,
    quarter_mode: Option<QuarterMode>,
) -> Result<()> {
    let mut config = ReportConfig::load(store)?;
    if let Some(mode) = quarter_mode {
        config.settings.quarter_mode = mode;
    }
    let processor = load(&config.settings, file, sheet)?;

    let request = ReportRequest {
        output,
        account_mappings: None,
        export_json,
    };
    let outcome = generate_bwa_report(&processor, &config, &request)?;

    println!("✅ {} ({} pages)", outcome.pdf_path.display(), outcome.pages);
    if let Some(json_path) = &outcome.json_path {
        println!("✅ {}", json_path.display());
    }
    println!("   Total: {:.2}", outcome.total);
    for discrepancy in &outcome.reconciliation.discrepancies {
        println!("⚠️  {}", discrepancy.description);
    }
    Ok(())
}

fn run_export_json(store: &SqliteStore, file: &Path, sheet: Option<&str>, output: &Path) -> Result<()> {
    let config = ReportConfig::load(store)?;
    let processor = load(&config.settings, file, sheet)?;
    let export = export_json(&processor, &config, output, None)?;

    println!(
        "✅ {} ({} accounts, {} quarters)",
        output.display(),
        export.account_details.len(),
        export.quarterly_summaries.len()
    );
    Ok(())
}

fn run_unmapped(store: &SqliteStore, file: &Path, sheet: Option<&str>) -> Result<()> {
    let config = ReportConfig::load(store)?;
    let processor = load(&config.settings, file, sheet)?;
    let unmapped = config.mappings.unmapped_accounts(processor.rows());

    if unmapped.is_empty() {
        println!("✅ All accounts are mapped");
        return Ok(());
    }
    for account in unmapped {
        let name = processor.account_names().get(&account).unwrap_or("");
        println!("{:<10} {}", account, name);
    }
    Ok(())
}

fn run_map(store: &mut SqliteStore, command: MapCommands) -> Result<()> {
    let mut mappings = MappingSet::load(&*store)?;
    match command {
        MapCommands::Set { account, group } => {
            mappings.accounts.set(&account, &group);
            mappings.save(store)?;
            println!("✓ {} → {}", account, group);
        }
        MapCommands::Remove { account } => {
            match mappings.accounts.remove(&account) {
                Some(group) => {
                    mappings.save(store)?;
                    println!("✓ removed {} → {}", account, group);
                }
                None => println!("No mapping for account {}", account),
            }
        }
        MapCommands::List => {
            for (account, group) in mappings.accounts.iter() {
                println!("{:<10} {:<30} {}", account, group, mappings.account_name(account));
            }
            let orphans = mappings.unused_groups();
            if !orphans.is_empty() {
                println!("⚠️  groups without super-group: {}", orphans.join(", "));
            }
        }
    }
    Ok(())
}

fn run_group(store: &mut SqliteStore, command: GroupCommands) -> Result<()> {
    let mut mappings = MappingSet::load(&*store)?;
    match command {
        GroupCommands::Set { group, super_group } => {
            mappings.super_groups.set(&group, &super_group);
            mappings.save(store)?;
            println!("✓ {} → {}", group, super_group);
        }
        GroupCommands::Remove { group } => match mappings.super_groups.remove(&group) {
            Some(super_group) => {
                mappings.save(store)?;
                println!("✓ removed {} → {}", group, super_group);
            }
            None => println!("No super-group for {}", group),
        },
        GroupCommands::List => {
            for (group, super_group) in mappings.super_groups.iter() {
                println!("{:<30} {}", group, super_group);
            }
        }
    }
    Ok(())
}

fn run_settings(store: &mut SqliteStore, command: SettingsCommands) -> Result<()> {
    let mut settings = Settings::load(&*store)?;
    match command {
        SettingsCommands::Show => {
            for (key, value) in settings.to_entries() {
                println!("{:<24} {}", key, value);
            }
        }
        SettingsCommands::Set { key, value } => {
            settings
                .set_value(&key, &value)
                .with_context(|| format!("Cannot set {}", key))?;
            settings.save(store)?;
            println!("✓ {} = {}", key, value);
        }
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_tui(store: &SqliteStore, file: &Path, sheet: Option<&str>) -> Result<()> {
    let config = ReportConfig::load(store)?;
    let processor = load(&config.settings, file, sheet)?;
    let config = bwa_report::resolve_config(&config, &processor, None);

    let mut app = bwa_report::ui::App::new(
        processor.rows().to_vec(),
        config.mappings,
        processor.year(),
        config.settings.quarter_mode,
    );
    app.language = config.settings.language;
    bwa_report::ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_tui(_store: &SqliteStore, _file: &Path, _sheet: Option<&str>) -> Result<()> {
    anyhow::bail!("TUI not available, rebuild with `--features tui`")
}

