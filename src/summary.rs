//! Monthly summary derivation
//!
//! Deterministic aggregation of extracted transactions into per-month
//! summaries. Runs locally after extraction; no collaborator involved.

use crate::models::{MonthlySummary, Transaction};
use chrono::Datelike;
use std::collections::BTreeMap;

#[derive(Default)]
struct MonthAccumulator {
    credits: f64,
    debits: f64,
    balances: Vec<f64>,
    /// Last running balance observed at or before the end of this month,
    /// used when the statement shows no per-transaction balances.
    carried_balance: Option<f64>,
    salary_candidate: bool,
}

/// Aggregate transactions into chronologically ordered monthly summaries.
///
/// `salary_credit_floor` is the minimum credit size considered a salary
/// candidate; a month reports `salary_detected` only when a candidate
/// appears in it and in a calendar-adjacent month (recurrence).
pub fn summarize_by_month(
    transactions: &[Transaction],
    salary_credit_floor: f64,
) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<(i32, u32), MonthAccumulator> = BTreeMap::new();
    let mut last_balance: Option<f64> = None;

    for txn in transactions {
        let key = (txn.date.year(), txn.date.month());
        let acc = months.entry(key).or_default();

        if txn.is_credit() {
            acc.credits += txn.amount;
            if txn.amount >= salary_credit_floor {
                acc.salary_candidate = true;
            }
        } else {
            acc.debits += txn.amount.abs();
        }

        if let Some(balance) = txn.balance {
            acc.balances.push(balance);
            last_balance = Some(balance);
        }
        acc.carried_balance = last_balance;
    }

    let keys: Vec<(i32, u32)> = months.keys().copied().collect();
    let candidates: Vec<bool> = months.values().map(|a| a.salary_candidate).collect();

    months
        .iter()
        .enumerate()
        .map(|(i, (key, acc))| {
            let avg_balance = if acc.balances.is_empty() {
                acc.carried_balance.unwrap_or(0.0)
            } else {
                acc.balances.iter().sum::<f64>() / acc.balances.len() as f64
            };

            let recurring_neighbor = (i > 0
                && candidates[i - 1]
                && is_adjacent_month(keys[i - 1], *key))
                || (i + 1 < keys.len()
                    && candidates[i + 1]
                    && is_adjacent_month(*key, keys[i + 1]));

            MonthlySummary {
                month: format!("{:04}-{:02}", key.0, key.1),
                total_credits: acc.credits,
                total_debits: acc.debits,
                net_flow: acc.credits - acc.debits,
                avg_balance,
                salary_detected: acc.salary_candidate && recurring_neighbor,
            }
        })
        .collect()
}

fn is_adjacent_month(earlier: (i32, u32), later: (i32, u32)) -> bool {
    let next = if earlier.1 == 12 {
        (earlier.0 + 1, 1)
    } else {
        (earlier.0, earlier.1 + 1)
    };
    next == later
}
