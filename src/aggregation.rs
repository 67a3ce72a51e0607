// 📊 Aggregation - sum transactions per period along account → group → super-group
//
// Summaries are computed on demand and never persisted. The quarter mode is
// always an explicit argument; nothing here reads configuration.

use crate::mappings::{MappingSet, UNASSIGNED};
use crate::normalize::account_sort_key;
use crate::processor::TransactionRow;
use crate::settings::QuarterMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// PERIODS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    /// Rows of exactly this quarter
    Quarter(u8),
    /// Rows of quarters 1..=n
    CumulativeQuarter(u8),
    Year,
}

impl Period {
    pub fn for_quarter(quarter: u8, mode: QuarterMode) -> Self {
        match mode {
            QuarterMode::Individual => Period::Quarter(quarter),
            QuarterMode::Cumulative => Period::CumulativeQuarter(quarter),
        }
    }

    pub fn contains(&self, row_quarter: u8) -> bool {
        match self {
            Period::Quarter(q) => row_quarter == *q,
            Period::CumulativeQuarter(q) => (1..=*q).contains(&row_quarter),
            Period::Year => (1..=4).contains(&row_quarter),
        }
    }

    pub fn quarter(&self) -> Option<u8> {
        match self {
            Period::Quarter(q) | Period::CumulativeQuarter(q) => Some(*q),
            Period::Year => None,
        }
    }
}

// ============================================================================
// PERIOD SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSummary {
    pub period: Period,
    /// BWA group → sum
    pub bwa_groups: BTreeMap<String, f64>,
    /// super-group → {BWA group → sum}
    pub super_groups: BTreeMap<String, BTreeMap<String, f64>>,
    /// BWA group → {account → sum}
    pub detailed_accounts: BTreeMap<String, BTreeMap<String, f64>>,
    pub total: f64,
    pub transaction_count: usize,
}

impl PeriodSummary {
    pub fn empty(period: Period) -> Self {
        PeriodSummary {
            period,
            bwa_groups: BTreeMap::new(),
            super_groups: BTreeMap::new(),
            detailed_accounts: BTreeMap::new(),
            total: 0.0,
            transaction_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_count == 0
    }

    pub fn group_total(&self, group: &str) -> f64 {
        self.bwa_groups.get(group).copied().unwrap_or(0.0)
    }

    pub fn super_group_total(&self, super_group: &str) -> f64 {
        self.super_groups
            .get(super_group)
            .map(|groups| groups.values().sum())
            .unwrap_or(0.0)
    }

    /// Super-groups alphabetically, with `Nicht zugeordnet` last
    pub fn ordered_super_groups(&self) -> Vec<(&String, &BTreeMap<String, f64>)> {
        let (mut named, unassigned): (Vec<_>, Vec<_>) = self
            .super_groups
            .iter()
            .partition(|(name, _)| name.as_str() != UNASSIGNED);
        named.extend(unassigned);
        named
    }

    /// Accounts of one BWA group, numerically ordered
    pub fn accounts_of(&self, group: &str) -> Vec<(&String, f64)> {
        let mut accounts: Vec<(&String, f64)> = self
            .detailed_accounts
            .get(group)
            .map(|m| m.iter().map(|(a, v)| (a, *v)).collect())
            .unwrap_or_default();
        accounts.sort_by_key(|(account, _)| account_sort_key(account));
        accounts
    }
}

/// Sum the rows of `period` into the account/group/super-group hierarchy
pub fn aggregate(rows: &[TransactionRow], period: Period, mappings: &MappingSet) -> PeriodSummary {
    let mut summary = PeriodSummary::empty(period);

    for row in rows.iter().filter(|r| period.contains(r.quarter)) {
        let group = mappings.accounts.group_for(&row.account_number);

        *summary.bwa_groups.entry(group.clone()).or_insert(0.0) += row.amount_clean;
        *summary
            .detailed_accounts
            .entry(group)
            .or_default()
            .entry(row.account_number.clone())
            .or_insert(0.0) += row.amount_clean;

        summary.total += row.amount_clean;
        summary.transaction_count += 1;
    }

    for (group, sum) in &summary.bwa_groups {
        let super_group = mappings.super_groups.super_group_for(group);
        summary
            .super_groups
            .entry(super_group)
            .or_default()
            .insert(group.clone(), *sum);
    }

    summary
}

/// Quarters (1..=4) that contain at least one row
pub fn quarters_present(rows: &[TransactionRow]) -> Vec<u8> {
    rows.iter()
        .map(|r| r.quarter)
        .filter(|q| (1..=4).contains(q))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// ACCOUNT TOTALS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AccountTotal {
    pub account_number: String,
    pub account_name: String,
    pub group: String,
    pub total: f64,
    pub transaction_count: usize,
}

/// Per-account totals over all rows, numerically ordered by account
///
/// The display name prefers the mapping table and falls back to the name
/// found in the import.
pub fn account_totals(rows: &[TransactionRow], mappings: &MappingSet) -> Vec<AccountTotal> {
    let mut by_account: BTreeMap<&str, AccountTotal> = BTreeMap::new();

    for row in rows {
        let entry = by_account
            .entry(row.account_number.as_str())
            .or_insert_with(|| AccountTotal {
                account_number: row.account_number.clone(),
                account_name: String::new(),
                group: mappings.accounts.group_for(&row.account_number),
                total: 0.0,
                transaction_count: 0,
            });
        if entry.account_name.is_empty() {
            entry.account_name = match mappings.names.get(&row.account_number) {
                Some(name) => name.to_string(),
                None => row.account_name.clone(),
            };
        }
        entry.total += row.amount_clean;
        entry.transaction_count += 1;
    }

    let mut totals: Vec<AccountTotal> = by_account.into_values().collect();
    totals.sort_by_key(|t| account_sort_key(&t.account_number));
    totals
}

// ============================================================================
// BALANCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub opening_balance: f64,
    pub total_transactions: f64,
    pub closing_balance: f64,
}

impl BalanceInfo {
    pub fn compute(opening_balance: f64, total_transactions: f64) -> Self {
        BalanceInfo {
            opening_balance,
            total_transactions,
            closing_balance: opening_balance + total_transactions,
        }
    }

    /// Balance over one period. For a single quarter the opening balance is
    /// carried forward through the preceding quarters.
    pub fn for_period(rows: &[TransactionRow], period: Period, opening_balance: f64) -> Self {
        let sum = |f: &dyn Fn(u8) -> bool| -> f64 {
            rows.iter()
                .filter(|r| f(r.quarter))
                .map(|r| r.amount_clean)
                .sum()
        };

        match period {
            Period::Quarter(q) => {
                let carried = sum(&|rq| rq < q);
                BalanceInfo::compute(opening_balance + carried, sum(&|rq| rq == q))
            }
            Period::CumulativeQuarter(_) | Period::Year => {
                BalanceInfo::compute(opening_balance, sum(&|rq| period.contains(rq)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(account: &str, amount: f64, month: u32) -> TransactionRow {
        let date = NaiveDate::from_ymd_opt(2024, month, 10).unwrap();
        TransactionRow {
            line: 2,
            booking_number: String::new(),
            account_number: account.to_string(),
            account_name: format!("Konto {}", account),
            booking_date: date,
            purpose: String::new(),
            amount: amount.to_string(),
            amount_clean: amount,
            quarter: crate::normalize::quarter_of(date),
        }
    }

    fn mappings() -> MappingSet {
        let mut m = MappingSet::default();
        m.accounts.set("4000", "Spenden");
        m.accounts.set("4100", "Beiträge");
        m.accounts.set("6000", "Miete");
        m.super_groups.set("Spenden", "Einnahmen");
        m.super_groups.set("Beiträge", "Einnahmen");
        m.super_groups.set("Miete", "Ausgaben");
        m
    }

    fn sample_rows() -> Vec<TransactionRow> {
        vec![
            row("4000", 1000.50, 1),
            row("6000", -450.00, 2),
            row("4100", 120.00, 4),
            row("4000", 80.00, 7),
            row("6000", -450.00, 8),
            row("7777", -15.25, 11),
        ]
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.005
    }

    #[test]
    fn test_two_row_example() {
        let rows = vec![row("4000", 1000.50, 1), row("6000", -450.00, 2)];
        let summary = aggregate(&rows, Period::Year, &mappings());

        assert!(close(summary.super_group_total("Einnahmen"), 1000.50));
        assert!(close(summary.super_group_total("Ausgaben"), -450.00));
        assert!(close(summary.total, 550.50));
        assert_eq!(summary.transaction_count, 2);
    }

    #[test]
    fn test_hierarchy_sums_agree_for_every_period() {
        let rows = sample_rows();
        let m = mappings();
        let mut periods = vec![Period::Year];
        for q in 1..=4 {
            periods.push(Period::Quarter(q));
            periods.push(Period::CumulativeQuarter(q));
        }

        for period in periods {
            let s = aggregate(&rows, period, &m);
            let by_super: f64 = s.super_groups.keys().map(|k| s.super_group_total(k)).sum();
            let by_group: f64 = s.bwa_groups.values().sum();
            let by_account: f64 = s.detailed_accounts.values().flat_map(|m| m.values()).sum();
            let by_rows: f64 = rows
                .iter()
                .filter(|r| period.contains(r.quarter))
                .map(|r| r.amount_clean)
                .sum();

            assert!(close(by_super, by_group), "{:?}", period);
            assert!(close(by_group, by_account), "{:?}", period);
            assert!(close(by_account, by_rows), "{:?}", period);
            assert!(close(s.total, by_rows), "{:?}", period);
        }
    }

    #[test]
    fn test_cumulative_is_union_of_individual_quarters() {
        let rows = sample_rows();
        let m = mappings();

        for n in 1..=4 {
            let cumulative = aggregate(&rows, Period::CumulativeQuarter(n), &m);
            let individual: f64 = (1..=n)
                .map(|q| aggregate(&rows, Period::Quarter(q), &m).total)
                .sum();
            let count: usize = (1..=n)
                .map(|q| aggregate(&rows, Period::Quarter(q), &m).transaction_count)
                .sum();

            assert!(close(cumulative.total, individual));
            assert_eq!(cumulative.transaction_count, count);
        }
    }

    #[test]
    fn test_unmapped_account_gets_synthetic_group_and_unassigned_super_group() {
        let summary = aggregate(&sample_rows(), Period::Quarter(4), &mappings());

        assert!(close(summary.group_total("Nicht zugeordnet (7777)"), -15.25));
        assert!(close(summary.super_group_total(UNASSIGNED), -15.25));
    }

    #[test]
    fn test_unassigned_super_group_sorts_last() {
        let mut m = mappings();
        m.super_groups.remove("Miete");
        let summary = aggregate(&sample_rows(), Period::Year, &m);

        let names: Vec<&String> = summary.ordered_super_groups().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.last().map(|s| s.as_str()), Some(UNASSIGNED));
        assert_eq!(names[0], "Einnahmen");
    }

    #[test]
    fn test_out_of_range_quarter_is_empty() {
        let rows = sample_rows();
        assert!(aggregate(&rows, Period::Quarter(0), &mappings()).is_empty());
        assert!(aggregate(&rows, Period::Quarter(5), &mappings()).is_empty());
        assert!(Period::for_quarter(2, QuarterMode::Cumulative).contains(1));
        assert!(!Period::for_quarter(2, QuarterMode::Individual).contains(1));
    }

    #[test]
    fn test_quarters_present_and_account_totals() {
        let rows = sample_rows();
        assert_eq!(quarters_present(&rows), vec![1, 2, 3, 4]);
        assert_eq!(quarters_present(&rows[..2]), vec![1]);

        let totals = account_totals(&rows, &mappings());
        let accounts: Vec<&str> = totals.iter().map(|t| t.account_number.as_str()).collect();
        assert_eq!(accounts, vec!["4000", "4100", "6000", "7777"]);
        assert!(close(totals[0].total, 1080.50));
        assert_eq!(totals[2].transaction_count, 2);
        assert_eq!(totals[3].group, "Nicht zugeordnet (7777)");
        assert_eq!(totals[3].account_name, "Konto 7777");
    }

    #[test]
    fn test_balance_carries_forward() {
        let rows = sample_rows();
        let q3 = BalanceInfo::for_period(&rows, Period::Quarter(3), 100.0);
        let cq3 = BalanceInfo::for_period(&rows, Period::CumulativeQuarter(3), 100.0);

        assert!(close(q3.opening_balance, 100.0 + 1000.50 - 450.0 + 120.0));
        assert!(close(q3.total_transactions, 80.0 - 450.0));
        assert!(close(q3.closing_balance, cq3.closing_balance));

        let year = BalanceInfo::for_period(&rows, Period::Year, 100.0);
        assert!(close(year.closing_balance, 100.0 + 285.25));
    }
}
