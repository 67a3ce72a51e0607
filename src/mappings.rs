// 🏷️ Mapping tables - account → BWA group → super-group
//
// Two-level hierarchy used by every aggregation:
//   Sachkonto "4000" → BWA-Gruppe "Spenden" → Obergruppe "Einnahmen"
//
// Each table is persisted as one JSON blob in the settings store.

use crate::db::AuditKind;
use crate::error::SettingsError;
use crate::normalize::{account_sort_key, normalize_account_str};
use crate::processor::TransactionRow;
use crate::settings::SettingsStore;
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const KEY_ACCOUNT_MAPPINGS: &str = "account_mappings";
pub const KEY_ACCOUNT_NAMES: &str = "account_names";
pub const KEY_SUPER_GROUP_MAPPINGS: &str = "super_group_mappings";

/// Super-group for BWA groups that have none
pub const UNASSIGNED: &str = "Nicht zugeordnet";

/// Synthetic BWA group for an account without mapping
pub fn unassigned_group(account: &str) -> String {
    format!("{} ({})", UNASSIGNED, account)
}

// ============================================================================
// ACCOUNT → BWA GROUP
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountMappings(BTreeMap<String, String>);

impl AccountMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account keys are normalized, so `"4000.0"` and `"4000"` are one entry
    pub fn set(&mut self, account: &str, group: &str) {
        self.0
            .insert(normalize_account_str(account), group.trim().to_string());
    }

    pub fn remove(&mut self, account: &str) -> Option<String> {
        self.0.remove(&normalize_account_str(account))
    }

    pub fn get(&self, account: &str) -> Option<&str> {
        self.0.get(account).map(String::as_str)
    }

    /// Mapped group, or `Nicht zugeordnet (<account>)`
    pub fn group_for(&self, account: &str) -> String {
        self.get(account)
            .map(str::to_string)
            .unwrap_or_else(|| unassigned_group(account))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct BWA groups referenced by any account
    pub fn groups(&self) -> BTreeSet<String> {
        self.0.values().cloned().collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for AccountMappings {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut mappings = AccountMappings::new();
        for (account, group) in map {
            mappings.set(&account, &group);
        }
        mappings
    }
}

// ============================================================================
// BWA GROUP → SUPER-GROUP
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuperGroupMappings(BTreeMap<String, String>);

impl SuperGroupMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, group: &str, super_group: &str) {
        self.0
            .insert(group.trim().to_string(), super_group.trim().to_string());
    }

    pub fn remove(&mut self, group: &str) -> Option<String> {
        self.0.remove(group.trim())
    }

    pub fn get(&self, group: &str) -> Option<&str> {
        self.0.get(group).map(String::as_str)
    }

    /// Mapped super-group, or `Nicht zugeordnet`
    pub fn super_group_for(&self, group: &str) -> String {
        self.get(group).unwrap_or(UNASSIGNED).to_string()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for SuperGroupMappings {
    fn from(map: BTreeMap<String, String>) -> Self {
        SuperGroupMappings(map)
    }
}

// ============================================================================
// ACCOUNT → DISPLAY NAME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNames(BTreeMap<String, String>);

impl AccountNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, account: &str, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.0.insert(normalize_account_str(account), name.to_string());
        }
    }

    pub fn remove(&mut self, account: &str) -> Option<String> {
        self.0.remove(&normalize_account_str(account))
    }

    pub fn get(&self, account: &str) -> Option<&str> {
        self.0.get(account).map(String::as_str)
    }

    /// Later names win; empty names never overwrite
    pub fn merge(&mut self, other: &AccountNames) {
        for (account, name) in other.iter() {
            self.set(account, name);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for AccountNames {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut names = AccountNames::new();
        for (account, name) in map {
            names.set(&account, &name);
        }
        names
    }
}

// ============================================================================
// MAPPING SET
// ============================================================================

/// All three tables, loaded and saved together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingSet {
    pub accounts: AccountMappings,
    pub names: AccountNames,
    pub super_groups: SuperGroupMappings,
}

impl MappingSet {
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        Ok(MappingSet {
            accounts: load_blob(store, KEY_ACCOUNT_MAPPINGS)?,
            names: load_blob(store, KEY_ACCOUNT_NAMES)?,
            super_groups: load_blob(store, KEY_SUPER_GROUP_MAPPINGS)?,
        })
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<()> {
        store.set(KEY_ACCOUNT_MAPPINGS, &serde_json::to_string(&self.accounts)?)?;
        store.set(KEY_ACCOUNT_NAMES, &serde_json::to_string(&self.names)?)?;
        store.set(
            KEY_SUPER_GROUP_MAPPINGS,
            &serde_json::to_string(&self.super_groups)?,
        )?;

        store.record_audit(
            AuditKind::MappingsSaved,
            serde_json::json!({
                "accounts": self.accounts.len(),
                "names": self.names.len(),
                "super_groups": self.super_groups.len(),
            }),
        )?;
        tracing::debug!(
            accounts = self.accounts.len(),
            super_groups = self.super_groups.len(),
            "mappings saved"
        );
        Ok(())
    }

    /// Display name of an account, empty when unknown
    pub fn account_name(&self, account: &str) -> &str {
        self.names.get(account).unwrap_or("")
    }

    /// Accounts in the data that have no BWA group, numerically ordered
    pub fn unmapped_accounts<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a TransactionRow>,
    ) -> Vec<String> {
        let mut accounts: Vec<String> = rows
            .into_iter()
            .map(|r| r.account_number.as_str())
            .filter(|a| self.accounts.get(a).is_none())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        accounts.sort_by_key(|a| account_sort_key(a));
        accounts
    }

    /// BWA groups referenced by account mappings but lacking a super-group
    pub fn unused_groups(&self) -> Vec<String> {
        self.accounts
            .groups()
            .into_iter()
            .filter(|g| self.super_groups.get(g).is_none())
            .collect()
    }
}

fn load_blob<T: DeserializeOwned + Default>(store: &dyn SettingsStore, key: &str) -> Result<T> {
    match store.get(key)? {
        None => Ok(T::default()),
        Some(raw) if raw.trim().is_empty() => Ok(T::default()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            SettingsError::CorruptBlob {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;
    use chrono::NaiveDate;

    fn row(account: &str) -> TransactionRow {
        TransactionRow {
            line: 2,
            booking_number: String::new(),
            account_number: account.to_string(),
            account_name: String::new(),
            booking_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            purpose: String::new(),
            amount: "1".to_string(),
            amount_clean: 1.0,
            quarter: 1,
        }
    }

    #[test]
    fn test_group_fallbacks() {
        let mut mappings = MappingSet::default();
        mappings.accounts.set("4000", "Spenden");
        mappings.super_groups.set("Spenden", "Einnahmen");

        assert_eq!(mappings.accounts.group_for("4000"), "Spenden");
        assert_eq!(mappings.accounts.group_for("6000"), "Nicht zugeordnet (6000)");
        assert_eq!(mappings.super_groups.super_group_for("Spenden"), "Einnahmen");
        assert_eq!(mappings.super_groups.super_group_for("Miete"), UNASSIGNED);
    }

    #[test]
    fn test_account_keys_are_normalized() {
        let mut accounts = AccountMappings::new();
        accounts.set("4000.0", "Spenden");
        accounts.set(" 4000 ", "Beiträge");

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts.get("4000"), Some("Beiträge"));
        assert_eq!(accounts.remove("4000.0"), Some("Beiträge".to_string()));
        assert!(accounts.is_empty());
    }

    #[test]
    fn test_store_roundtrip() {
        let mut store = MemoryStore::new();
        let mut mappings = MappingSet::default();
        mappings.accounts.set("4000", "Spenden");
        mappings.names.set("4000", "Spenden allgemein");
        mappings.super_groups.set("Spenden", "Einnahmen");

        mappings.save(&mut store).unwrap();
        let raw = store.get(KEY_ACCOUNT_MAPPINGS).unwrap().unwrap();
        assert_eq!(raw, r#"{"4000":"Spenden"}"#);

        let loaded = MappingSet::load(&store).unwrap();
        assert_eq!(loaded, mappings);
        assert_eq!(loaded.account_name("4000"), "Spenden allgemein");
        assert_eq!(loaded.account_name("9999"), "");
    }

    #[test]
    fn test_corrupt_blob_names_the_key() {
        let mut store = MemoryStore::new();
        store.set(KEY_SUPER_GROUP_MAPPINGS, "{not json").unwrap();

        let err = MappingSet::load(&store).unwrap_err();
        match err.downcast_ref::<SettingsError>() {
            Some(SettingsError::CorruptBlob { key, .. }) => {
                assert_eq!(key, KEY_SUPER_GROUP_MAPPINGS)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_accounts_and_unused_groups() {
        let mut mappings = MappingSet::default();
        mappings.accounts.set("4000", "Spenden");
        mappings.accounts.set("6000", "Miete");
        mappings.super_groups.set("Spenden", "Einnahmen");

        let rows = vec![row("4000"), row("10000"), row("800"), row("800")];
        assert_eq!(mappings.unmapped_accounts(&rows), vec!["800", "10000"]);
        assert_eq!(mappings.unused_groups(), vec!["Miete"]);
    }

    #[test]
    fn test_names_merge_keeps_existing_on_empty() {
        let mut names = AccountNames::new();
        names.set("4000", "Spenden");
        names.set("4000", "   ");
        assert_eq!(names.get("4000"), Some("Spenden"));

        let mut incoming = AccountNames::new();
        incoming.set("6000", "Miete");
        names.merge(&incoming);
        assert_eq!(names.len(), 2);
    }
}
