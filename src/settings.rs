// ⚙️ Settings - explicit configuration snapshot over a key/value backend
//
// Every value lives under a flat string key in a `SettingsStore`. `Settings`
// is loaded once per operation and passed by reference, so a report never
// mixes two quarter modes.

use crate::db::AuditKind;
use crate::error::SettingsError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// KEYS
// ============================================================================

pub const KEY_LANGUAGE: &str = "language";
pub const KEY_DECIMAL_FORMAT: &str = "decimal_format";
pub const KEY_CSV_DELIMITER: &str = "csv_delimiter";
pub const KEY_QUARTER_MODE: &str = "quarter_mode";
pub const KEY_INCLUDE_QUARTERLY: &str = "include_quarterly";
pub const KEY_INCLUDE_CHARTS: &str = "include_charts";
pub const KEY_INCLUDE_ACCOUNT_DETAILS: &str = "include_account_details";
pub const KEY_EXPORT_JSON: &str = "export_json";
pub const KEY_HEADER_COLOR: &str = "header_color";
pub const KEY_ORG_NAME: &str = "org_name";
pub const KEY_ORG_STREET: &str = "org_street";
pub const KEY_ORG_ZIP: &str = "org_zip";
pub const KEY_ORG_CITY: &str = "org_city";
pub const KEY_ORG_PHONE: &str = "org_phone";
pub const KEY_ORG_EMAIL: &str = "org_email";
pub const KEY_ORG_INFO: &str = "org_info";
pub const KEY_LOGO_PATH: &str = "logo_path";
pub const KEY_OPENING_BALANCE: &str = "opening_balance";

/// Keys editable through `Settings::set_value`. The mapping blobs are owned
/// by `mappings::MappingSet` and are not listed here.
pub const SETTINGS_KEYS: &[&str] = &[
    KEY_LANGUAGE,
    KEY_DECIMAL_FORMAT,
    KEY_CSV_DELIMITER,
    KEY_QUARTER_MODE,
    KEY_INCLUDE_QUARTERLY,
    KEY_INCLUDE_CHARTS,
    KEY_INCLUDE_ACCOUNT_DETAILS,
    KEY_EXPORT_JSON,
    KEY_HEADER_COLOR,
    KEY_ORG_NAME,
    KEY_ORG_STREET,
    KEY_ORG_ZIP,
    KEY_ORG_CITY,
    KEY_ORG_PHONE,
    KEY_ORG_EMAIL,
    KEY_ORG_INFO,
    KEY_LOGO_PATH,
    KEY_OPENING_BALANCE,
];

pub const DEFAULT_HEADER_COLOR: &str = "#2F5496";

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Which character is the decimal separator in text amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalFormat {
    /// `1.234,56`
    #[default]
    German,
    /// `1,234.56`
    English,
}

impl DecimalFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecimalFormat::German => "german",
            DecimalFormat::English => "english",
        }
    }
}

impl FromStr for DecimalFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "german" | "de" | "comma" | "," => Ok(DecimalFormat::German),
            "english" | "en" | "dot" | "." => Ok(DecimalFormat::English),
            _ => Err(SettingsError::invalid(
                KEY_DECIMAL_FORMAT,
                s,
                "expected 'german' or 'english'",
            )),
        }
    }
}

/// How quarter sections select their rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarterMode {
    /// Only the rows of quarter N ("quartalsweise")
    #[default]
    Individual,
    /// All rows of quarters 1..=N ("kumulativ")
    Cumulative,
}

impl QuarterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarterMode::Individual => "individual",
            QuarterMode::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for QuarterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuarterMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" | "quartalsweise" => Ok(QuarterMode::Individual),
            "cumulative" | "kumulativ" => Ok(QuarterMode::Cumulative),
            _ => Err(SettingsError::invalid(
                KEY_QUARTER_MODE,
                s,
                "expected 'individual' or 'cumulative'",
            )),
        }
    }
}

/// Report language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    German,
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::German => "de",
            Language::English => "en",
        }
    }
}

impl FromStr for Language {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "de" | "german" | "deutsch" => Ok(Language::German),
            "en" | "english" | "englisch" => Ok(Language::English),
            _ => Err(SettingsError::invalid(KEY_LANGUAGE, s, "expected 'de' or 'en'")),
        }
    }
}

/// Contact block printed on the cover page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub name: String,
    pub street: String,
    pub zip: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub info: String,
}

impl Organization {
    /// Non-empty lines of the address block, in print order
    pub fn address_lines(&self) -> Vec<String> {
        let zip_city = format!("{} {}", self.zip, self.city).trim().to_string();
        [
            self.name.clone(),
            self.street.clone(),
            zip_city,
            self.phone.clone(),
            self.email.clone(),
            self.info.clone(),
        ]
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect()
    }
}

/// Which optional report sections are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSections {
    pub include_quarterly: bool,
    pub include_charts: bool,
    pub include_account_details: bool,
    pub export_json: bool,
}

impl Default for ReportSections {
    fn default() -> Self {
        ReportSections {
            include_quarterly: true,
            include_charts: true,
            include_account_details: true,
            export_json: false,
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub language: Language,
    pub decimal_format: DecimalFormat,
    pub csv_delimiter: char,
    pub quarter_mode: QuarterMode,
    pub sections: ReportSections,
    pub header_color: String,
    pub organization: Organization,
    pub logo_path: Option<PathBuf>,
    pub opening_balance: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            language: Language::default(),
            decimal_format: DecimalFormat::default(),
            csv_delimiter: ';',
            quarter_mode: QuarterMode::default(),
            sections: ReportSections::default(),
            header_color: DEFAULT_HEADER_COLOR.to_string(),
            organization: Organization::default(),
            logo_path: None,
            opening_balance: 0.0,
        }
    }
}

impl Settings {
    /// Load from a store. Missing keys keep their defaults; unreadable values
    /// are skipped with a warning so one bad key never locks the user out.
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        let mut settings = Settings::default();

        for key in SETTINGS_KEYS {
            if let Some(value) = store.get(key)? {
                if let Err(err) = settings.set_value(key, &value) {
                    tracing::warn!(key = *key, %err, "ignoring stored setting");
                }
            }
        }

        Ok(settings)
    }

    /// Write every key back to the store
    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<()> {
        for (key, value) in self.to_entries() {
            store.set(key, &value)?;
        }
        store.record_audit(AuditKind::SettingsSaved, serde_json::json!({ "keys": SETTINGS_KEYS.len() }))?;
        Ok(())
    }

    /// Parse and apply a single value
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            KEY_LANGUAGE => self.language = value.parse()?,
            KEY_DECIMAL_FORMAT => self.decimal_format = value.parse()?,
            KEY_CSV_DELIMITER => self.csv_delimiter = parse_delimiter(value)?,
            KEY_QUARTER_MODE => self.quarter_mode = value.parse()?,
            KEY_INCLUDE_QUARTERLY => self.sections.include_quarterly = parse_bool(key, value)?,
            KEY_INCLUDE_CHARTS => self.sections.include_charts = parse_bool(key, value)?,
            KEY_INCLUDE_ACCOUNT_DETAILS => {
                self.sections.include_account_details = parse_bool(key, value)?
            }
            KEY_EXPORT_JSON => self.sections.export_json = parse_bool(key, value)?,
            KEY_HEADER_COLOR => {
                parse_hex_color(value)?;
                self.header_color = value.trim().to_string();
            }
            KEY_ORG_NAME => self.organization.name = value.to_string(),
            KEY_ORG_STREET => self.organization.street = value.to_string(),
            KEY_ORG_ZIP => self.organization.zip = value.to_string(),
            KEY_ORG_CITY => self.organization.city = value.to_string(),
            KEY_ORG_PHONE => self.organization.phone = value.to_string(),
            KEY_ORG_EMAIL => self.organization.email = value.to_string(),
            KEY_ORG_INFO => self.organization.info = value.to_string(),
            KEY_LOGO_PATH => {
                self.logo_path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value.trim()))
                }
            }
            KEY_OPENING_BALANCE => {
                self.opening_balance =
                    crate::normalize::clean_amount_str(value, self.decimal_format).ok_or_else(
                        || SettingsError::invalid(key, value, "not a number"),
                    )?
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// All keys with their string form, in `SETTINGS_KEYS` order
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        let org = &self.organization;
        vec![
            (KEY_LANGUAGE, self.language.code().to_string()),
            (KEY_DECIMAL_FORMAT, self.decimal_format.as_str().to_string()),
            (KEY_CSV_DELIMITER, delimiter_to_string(self.csv_delimiter)),
            (KEY_QUARTER_MODE, self.quarter_mode.as_str().to_string()),
            (KEY_INCLUDE_QUARTERLY, self.sections.include_quarterly.to_string()),
            (KEY_INCLUDE_CHARTS, self.sections.include_charts.to_string()),
            (
                KEY_INCLUDE_ACCOUNT_DETAILS,
                self.sections.include_account_details.to_string(),
            ),
            (KEY_EXPORT_JSON, self.sections.export_json.to_string()),
            (KEY_HEADER_COLOR, self.header_color.clone()),
            (KEY_ORG_NAME, org.name.clone()),
            (KEY_ORG_STREET, org.street.clone()),
            (KEY_ORG_ZIP, org.zip.clone()),
            (KEY_ORG_CITY, org.city.clone()),
            (KEY_ORG_PHONE, org.phone.clone()),
            (KEY_ORG_EMAIL, org.email.clone()),
            (KEY_ORG_INFO, org.info.clone()),
            (
                KEY_LOGO_PATH,
                self.logo_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            (KEY_OPENING_BALANCE, format_plain_number(self.opening_balance, self.decimal_format)),
        ]
    }

    /// Header colour as RGB fractions; falls back to the default colour
    pub fn header_rgb(&self) -> (f32, f32, f32) {
        parse_hex_color(&self.header_color)
            .or_else(|_| parse_hex_color(DEFAULT_HEADER_COLOR))
            .unwrap_or((0.0, 0.0, 0.0))
    }

    /// Delimiter as a byte for the CSV reader (non-ASCII falls back to `;`)
    pub fn csv_delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b';'
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "ja" | "on" => Ok(true),
        "false" | "0" | "no" | "nein" | "off" => Ok(false),
        _ => Err(SettingsError::invalid(key, value, "expected true or false")),
    }
}

fn parse_delimiter(value: &str) -> Result<char, SettingsError> {
    match value {
        "\\t" | "tab" | "TAB" | "\t" => return Ok('\t'),
        _ => {}
    }
    let mut chars = value.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(SettingsError::invalid(
            KEY_CSV_DELIMITER,
            value,
            "expected a single ASCII character",
        )),
    }
}

fn delimiter_to_string(c: char) -> String {
    if c == '\t' {
        "tab".to_string()
    } else {
        c.to_string()
    }
}

fn format_plain_number(value: f64, format: DecimalFormat) -> String {
    let text = format!("{:.2}", value);
    match format {
        DecimalFormat::German => text.replace('.', ","),
        DecimalFormat::English => text,
    }
}

/// Parse `#RRGGBB` (or `RRGGBB`) into RGB fractions
pub fn parse_hex_color(value: &str) -> Result<(f32, f32, f32), SettingsError> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || SettingsError::invalid(KEY_HEADER_COLOR, value, "expected #RRGGBB");

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| -> Result<f32, SettingsError> {
        u8::from_str_radix(&hex[range], 16)
            .map(|v| v as f32 / 255.0)
            .map_err(|_| invalid())
    };

    Ok((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

// ============================================================================
// STORE BACKENDS
// ============================================================================

/// Flat string key/value persistence
///
/// The SQLite implementation lives in `db`; `MemoryStore` backs tests and
/// one-shot runs.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;

    /// All stored entries, ordered by key
    fn entries(&self) -> Result<Vec<(String, String)>>;

    /// Append an audit entry; backends without an audit log ignore it
    fn record_audit(&mut self, _kind: AuditKind, _details: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_store_is_empty() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.csv_delimiter, ';');
        assert_eq!(settings.decimal_format, DecimalFormat::German);
        assert_eq!(settings.quarter_mode, QuarterMode::Individual);
        assert!(settings.sections.include_charts);
        assert!(!settings.sections.export_json);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let mut store = MemoryStore::new();
        let mut settings = Settings::default();
        settings.language = Language::English;
        settings.quarter_mode = QuarterMode::Cumulative;
        settings.csv_delimiter = '\t';
        settings.sections.include_charts = false;
        settings.organization.name = "Musikverein Harmonie e.V.".to_string();
        settings.organization.city = "Freiburg".to_string();
        settings.opening_balance = 1234.5;
        settings.logo_path = Some(PathBuf::from("/tmp/logo.png"));

        settings.save(&mut store).unwrap();
        let loaded = Settings::load(&store).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_stored_value_falls_back_to_default() {
        let mut store = MemoryStore::new();
        store.set(KEY_QUARTER_MODE, "sometimes").unwrap();
        store.set(KEY_ORG_NAME, "Verein").unwrap();

        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings.quarter_mode, QuarterMode::Individual);
        assert_eq!(settings.organization.name, "Verein");
    }

    #[test]
    fn test_set_value_rejects_unknown_key_and_bad_values() {
        let mut settings = Settings::default();

        assert_eq!(
            settings.set_value("window_geometry", "x"),
            Err(SettingsError::UnknownKey("window_geometry".to_string()))
        );
        assert!(settings.set_value(KEY_HEADER_COLOR, "blue").is_err());
        assert!(settings.set_value(KEY_INCLUDE_CHARTS, "maybe").is_err());
        assert!(settings.set_value(KEY_CSV_DELIMITER, ";;").is_err());
        assert!(settings.set_value(KEY_OPENING_BALANCE, "abc").is_err());
    }

    #[test]
    fn test_opening_balance_uses_decimal_format() {
        let mut settings = Settings::default();
        settings.set_value(KEY_OPENING_BALANCE, "1.500,25").unwrap();
        assert!((settings.opening_balance - 1500.25).abs() < 1e-9);

        settings.set_value(KEY_DECIMAL_FORMAT, "english").unwrap();
        settings.set_value(KEY_OPENING_BALANCE, "2,000.75").unwrap();
        assert!((settings.opening_balance - 2000.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000").unwrap(), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00ff00").unwrap(), (0.0, 1.0, 0.0));
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#GG0000").is_err());

        let mut settings = Settings::default();
        settings.header_color = "broken".to_string();
        let (r, g, b) = settings.header_rgb();
        assert!(r < 0.2 && g > 0.3 && b > 0.5);
    }

    #[test]
    fn test_organization_address_lines_skip_empty_fields() {
        let org = Organization {
            name: "Verein".to_string(),
            zip: "79098".to_string(),
            city: "Freiburg".to_string(),
            ..Default::default()
        };
        assert_eq!(org.address_lines(), vec!["Verein", "79098 Freiburg"]);
    }

    #[test]
    fn test_quarter_mode_parse() {
        assert_eq!("kumulativ".parse::<QuarterMode>().unwrap(), QuarterMode::Cumulative);
        assert_eq!("Individual".parse::<QuarterMode>().unwrap(), QuarterMode::Individual);
        assert!("yearly".parse::<QuarterMode>().is_err());
    }
}
