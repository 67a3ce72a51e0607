// 🗄️ SQLite settings store - key/value table plus an append-only audit log
//
// One database file holds every persisted setting and mapping table. Each
// change is also written to `audit_log` so the history of a setting or a
// mapping table can be traced back.

use crate::settings::SettingsStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// AUDIT LOG
// ============================================================================

/// What an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// One settings key got a new value
    SettingChanged,
    SettingRemoved,
    /// `Settings::save` finished writing the whole snapshot
    SettingsSaved,
    /// The account / super-group / name tables were saved
    MappingsSaved,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::SettingChanged => "setting_changed",
            AuditKind::SettingRemoved => "setting_removed",
            AuditKind::SettingsSaved => "settings_saved",
            AuditKind::MappingsSaved => "mappings_saved",
        }
    }
}

impl FromStr for AuditKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "setting_changed" => Ok(AuditKind::SettingChanged),
            "setting_removed" => Ok(AuditKind::SettingRemoved),
            "settings_saved" => Ok(AuditKind::SettingsSaved),
            "mappings_saved" => Ok(AuditKind::MappingsSaved),
            other => Err(anyhow!("Unknown audit kind: {}", other)),
        }
    }
}

/// One row of the audit log
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub kind: AuditKind,
    /// Settings key for per-key entries
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Counts and other context of table-wide saves
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(kind: AuditKind) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            kind,
            key: None,
            old_value: None,
            new_value: None,
            details: serde_json::Value::Null,
        }
    }

    /// Change of a single key; `old` is `None` for a first write
    pub fn key_change(kind: AuditKind, key: &str, old: Option<String>, new: Option<&str>) -> Self {
        Self {
            key: Some(key.to_string()),
            old_value: old,
            new_value: new.map(str::to_string),
            ..Self::new(kind)
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Settings Table (flat key/value, JSON blobs for the mapping tables)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Audit Log (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            recorded_at TEXT NOT NULL,
            kind TEXT NOT NULL,
            key TEXT,
            old_value TEXT,
            new_value TEXT,
            details TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_log_key ON audit_log(key)",
        [],
    )?;

    Ok(())
}

pub fn append_audit(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (
            entry_id, recorded_at, kind, key, old_value, new_value, details
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.entry_id.to_string(),
            entry.recorded_at.to_rfc3339(),
            entry.kind.as_str(),
            entry.key,
            entry.old_value,
            entry.new_value,
            serde_json::to_string(&entry.details)?,
        ],
    )
    .with_context(|| format!("Failed to append audit entry '{}'", entry.kind.as_str()))?;

    Ok(())
}

/// Audit entries, newest first; `key` restricts them to one settings key
pub fn audit_trail(conn: &Connection, key: Option<&str>) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, recorded_at, kind, key, old_value, new_value, details
         FROM audit_log
         WHERE ?1 IS NULL OR key = ?1
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(entry_id, recorded_at, kind, key, old_value, new_value, details)| -> Result<AuditEntry> {
            Ok(AuditEntry {
                entry_id: Uuid::parse_str(&entry_id)
                    .with_context(|| format!("Corrupt audit entry id: {}", entry_id))?,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .with_context(|| format!("Corrupt audit timestamp: {}", recorded_at))?
                    .with_timezone(&Utc),
                kind: kind.parse()?,
                key,
                old_value,
                new_value,
                details: serde_json::from_str(&details)?,
            })
        })
        .collect()
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open settings database: {}", path.display()))?;
        setup_database(&conn)?;

        tracing::debug!(path = %path.display(), "opened settings database");
        Ok(SqliteStore { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// `<data dir>/bwa-report/settings.db`, or the working directory when
    /// the platform has no data dir
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bwa-report")
            .join("settings.db")
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// History of one settings key, newest first
    pub fn history(&self, key: &str) -> Result<Vec<AuditEntry>> {
        audit_trail(&self.conn, Some(key))
    }

    /// Whole audit log, newest first
    pub fn audit_log(&self) -> Result<Vec<AuditEntry>> {
        audit_trail(&self.conn, None)
    }
}

impl SettingsStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read setting '{}'", key))?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.get(key)?;
        if previous.as_deref() == Some(value) {
            return Ok(());
        }

        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to write setting '{}'", key))?;

        let entry = AuditEntry::key_change(AuditKind::SettingChanged, key, previous, Some(value));
        append_audit(&self.conn, &entry)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let Some(previous) = self.get(key)? else {
            return Ok(());
        };
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to remove setting '{}'", key))?;

        let entry = AuditEntry::key_change(AuditKind::SettingRemoved, key, Some(previous), None);
        append_audit(&self.conn, &entry)
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM settings ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn record_audit(&mut self, kind: AuditKind, details: serde_json::Value) -> Result<()> {
        append_audit(&self.conn, &AuditEntry::new(kind).with_details(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::MappingSet;
    use crate::settings::{QuarterMode, Settings};

    #[test]
    fn test_get_set_remove() {
        let mut store = SqliteStore::in_memory().unwrap();

        assert_eq!(store.get("org_name").unwrap(), None);
        store.set("org_name", "Verein").unwrap();
        assert_eq!(store.get("org_name").unwrap().as_deref(), Some("Verein"));

        store.set("org_name", "Verein e.V.").unwrap();
        assert_eq!(store.get("org_name").unwrap().as_deref(), Some("Verein e.V."));

        store.remove("org_name").unwrap();
        assert_eq!(store.get("org_name").unwrap(), None);
    }

    #[test]
    fn test_key_history() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.set("quarter_mode", "individual").unwrap();
        store.set("quarter_mode", "individual").unwrap(); // unchanged, no entry
        store.set("quarter_mode", "cumulative").unwrap();
        store.remove("quarter_mode").unwrap();
        store.remove("quarter_mode").unwrap(); // already gone, no entry
        store.set("language", "en").unwrap();

        let history = store.history("quarter_mode").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].kind, AuditKind::SettingRemoved);
        assert_eq!(history[0].old_value.as_deref(), Some("cumulative"));
        assert_eq!(history[0].new_value, None);
        assert_eq!(history[1].kind, AuditKind::SettingChanged);
        assert_eq!(history[1].old_value.as_deref(), Some("individual"));
        assert_eq!(history[1].new_value.as_deref(), Some("cumulative"));
        assert_eq!(history[2].old_value, None);
        assert!(history.iter().all(|e| e.key.as_deref() == Some("quarter_mode")));

        println!("✅ Key history test PASSED");
    }

    #[test]
    fn test_table_saves_are_audited() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut mappings = MappingSet::default();
        mappings.accounts.set("4000", "Spenden");
        mappings.save(&mut store).unwrap();
        Settings::default().save(&mut store).unwrap();

        let log = store.audit_log().unwrap();
        assert_eq!(log[0].kind, AuditKind::SettingsSaved);
        let saved = log
            .iter()
            .find(|e| e.kind == AuditKind::MappingsSaved)
            .unwrap();
        assert_eq!(saved.key, None);
        assert_eq!(saved.details["accounts"], 1);
        // Each entry gets its own id
        let ids: std::collections::HashSet<_> = log.iter().map(|e| e.entry_id).collect();
        assert_eq!(ids.len(), log.len());
    }

    #[test]
    fn test_audit_kind_names() {
        for kind in [
            AuditKind::SettingChanged,
            AuditKind::SettingRemoved,
            AuditKind::SettingsSaved,
            AuditKind::MappingsSaved,
        ] {
            assert_eq!(kind.as_str().parse::<AuditKind>().unwrap(), kind);
        }
        assert!("deleted".parse::<AuditKind>().is_err());
    }

    #[test]
    fn test_settings_survive_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            let mut settings = Settings::default();
            settings.quarter_mode = QuarterMode::Cumulative;
            settings.organization.name = "Förderverein".to_string();
            settings.save(&mut store).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = Settings::load(&store).unwrap();
        assert_eq!(loaded.quarter_mode, QuarterMode::Cumulative);
        assert_eq!(loaded.organization.name, "Förderverein");

        let keys: Vec<String> = store.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"org_name".to_string()));
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = SqliteStore::default_path();
        assert!(path.ends_with("bwa-report/settings.db"));
    }
}
