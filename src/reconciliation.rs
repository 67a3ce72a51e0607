// ⚖️ Reconciliation Engine - check that the BWA adds up
//
// After aggregation every level of the hierarchy must sum to the same total:
//   Σ super-groups = Σ BWA groups = Σ accounts = Σ transactions
//
// Besides the arithmetic, the engine lists bookkeeping gaps (unmapped
// accounts, groups without super-group) and, for re-imported JSON exports,
// differences between the embedded and the current mapping tables.
// Findings are warnings; they never stop a report.

use crate::aggregation::{BalanceInfo, PeriodSummary};
use crate::mappings::{AccountMappings, MappingSet};
use crate::processor::TransactionRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// All hierarchy levels agree within tolerance
    Balanced { total: f64 },

    /// At least one level differs from the transaction total
    Unbalanced {
        transaction_total: f64,
        summary_total: f64,
        difference: f64,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn difference(&self) -> f64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0.0,
            ReconciliationResult::Unbalanced { difference, .. } => *difference,
        }
    }
}

// ============================================================================
// DISCREPANCIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    /// Hierarchy levels do not sum to the same value
    TotalMismatch,
    /// Account has bookings but no BWA group
    UnmappedAccount,
    /// BWA group has no super-group
    GroupWithoutSuperGroup,
    /// Embedded JSON mapping differs from the current one
    MappingDrift,
    /// Embedded closing balance differs from the recomputed one
    BalanceMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub description: String,
    pub amount: f64,
    pub category: DiscrepancyCategory,
}

impl Discrepancy {
    fn new(category: DiscrepancyCategory, amount: f64, description: String) -> Self {
        Discrepancy {
            description,
            amount,
            category,
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub result: ReconciliationResult,
    pub transaction_count: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.result.is_balanced()
    }

    pub fn of_category(&self, category: DiscrepancyCategory) -> Vec<&Discrepancy> {
        self.discrepancies
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn add(&mut self, discrepancies: impl IntoIterator<Item = Discrepancy>) {
        self.discrepancies.extend(discrepancies);
    }

    /// Emit every finding as a warning
    pub fn log(&self) {
        for d in &self.discrepancies {
            tracing::warn!(category = ?d.category, amount = d.amount, "{}", d.description);
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} transactions, {}, {} finding(s)",
            self.transaction_count,
            if self.is_balanced() {
                "balanced".to_string()
            } else {
                format!("UNBALANCED by {:.2}", self.result.difference())
            },
            self.discrepancies.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: 0.01)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.01 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine { tolerance }
    }

    /// Check one period summary against the rows it was built from
    pub fn reconcile(
        &self,
        rows: &[TransactionRow],
        summary: &PeriodSummary,
        mappings: &MappingSet,
    ) -> ReconciliationReport {
        let period_rows: Vec<&TransactionRow> = rows
            .iter()
            .filter(|r| summary.period.contains(r.quarter))
            .collect();
        let transaction_total: f64 = period_rows.iter().map(|r| r.amount_clean).sum();

        let level_totals = [
            ("super-groups", summary.super_groups.values().flat_map(|g| g.values()).sum::<f64>()),
            ("BWA groups", summary.bwa_groups.values().sum::<f64>()),
            (
                "accounts",
                summary.detailed_accounts.values().flat_map(|a| a.values()).sum::<f64>(),
            ),
            ("summary total", summary.total),
        ];

        let mut discrepancies = Vec::new();
        let mut worst: Option<(f64, f64)> = None;
        for (level, total) in level_totals {
            let difference = (total - transaction_total).abs();
            if difference >= self.tolerance {
                discrepancies.push(Discrepancy::new(
                    DiscrepancyCategory::TotalMismatch,
                    difference,
                    format!(
                        "Sum over {} is {:.2}, transactions sum to {:.2}",
                        level, total, transaction_total
                    ),
                ));
                if worst.map_or(true, |(d, _)| difference > d) {
                    worst = Some((difference, total));
                }
            }
        }

        let result = match worst {
            None => ReconciliationResult::Balanced {
                total: transaction_total,
            },
            Some((difference, summary_total)) => ReconciliationResult::Unbalanced {
                transaction_total,
                summary_total,
                difference,
            },
        };

        discrepancies.extend(self.unmapped_accounts(&period_rows, mappings));
        discrepancies.extend(self.groups_without_super_group(summary, mappings));

        ReconciliationReport {
            result,
            transaction_count: period_rows.len(),
            discrepancies,
            reconciled_at: chrono::Utc::now(),
        }
    }

    fn unmapped_accounts(
        &self,
        rows: &[&TransactionRow],
        mappings: &MappingSet,
    ) -> Vec<Discrepancy> {
        mappings
            .unmapped_accounts(rows.iter().copied())
            .into_iter()
            .map(|account| {
                let sum: f64 = rows
                    .iter()
                    .filter(|r| r.account_number == account)
                    .map(|r| r.amount_clean)
                    .sum();
                Discrepancy::new(
                    DiscrepancyCategory::UnmappedAccount,
                    sum,
                    format!("Account {} has no BWA group ({:.2})", account, sum),
                )
            })
            .collect()
    }

    fn groups_without_super_group(
        &self,
        summary: &PeriodSummary,
        mappings: &MappingSet,
    ) -> Vec<Discrepancy> {
        summary
            .bwa_groups
            .iter()
            .filter(|(group, _)| {
                mappings.accounts.groups().contains(*group)
                    && mappings.super_groups.get(group).is_none()
            })
            .map(|(group, sum)| {
                Discrepancy::new(
                    DiscrepancyCategory::GroupWithoutSuperGroup,
                    *sum,
                    format!("BWA group '{}' has no super-group ({:.2})", group, sum),
                )
            })
            .collect()
    }

    /// Compare the account mappings embedded in a JSON export with the
    /// currently persisted ones
    pub fn check_mapping_drift(
        &self,
        embedded: &AccountMappings,
        current: &AccountMappings,
    ) -> Vec<Discrepancy> {
        let accounts: BTreeSet<&String> = embedded
            .iter()
            .map(|(a, _)| a)
            .chain(current.iter().map(|(a, _)| a))
            .collect();

        accounts
            .into_iter()
            .filter_map(|account| {
                let before = embedded.get(account);
                let now = current.get(account);
                if before == now {
                    return None;
                }
                Some(Discrepancy::new(
                    DiscrepancyCategory::MappingDrift,
                    0.0,
                    format!(
                        "Account {}: export maps to '{}', current mapping is '{}'",
                        account,
                        before.unwrap_or("-"),
                        now.unwrap_or("-")
                    ),
                ))
            })
            .collect()
    }

    /// Embedded closing balance vs. the recomputed one
    pub fn check_balance(&self, embedded: &BalanceInfo, computed: &BalanceInfo) -> Option<Discrepancy> {
        let difference = computed.closing_balance - embedded.closing_balance;
        if difference.abs() < self.tolerance {
            return None;
        }
        Some(Discrepancy::new(
            DiscrepancyCategory::BalanceMismatch,
            difference,
            format!(
                "Closing balance in export is {:.2}, recomputed {:.2}",
                embedded.closing_balance, computed.closing_balance
            ),
        ))
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
