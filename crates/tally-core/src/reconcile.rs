//! Budget reconciliation engine
//!
//! Keeps each budget's cached `current_amount` in step with the expenses that
//! fall into its category and date window. Every transaction mutation is
//! translated into one or more [`BudgetDelta`]s:
//!
//! - create: `+effect` at the transaction's date
//! - update: `-old_effect` at the old date/category, then `+new_effect` at the new ones
//! - delete: `-effect` at the transaction's date
//!
//! where `effect` is the expense contribution (`-amount` for expenses, nothing
//! for income). Totals are clamped at zero, so a decrease that would go
//! negative is absorbed and a later increase does not restore it.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::models::Transaction;

/// How transaction writes and budget adjustments share a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// One SQLite transaction covers both; a budget failure rolls back the write
    #[default]
    Atomic,
    /// The write commits first; a budget failure is reported, not rolled back
    BestEffort,
}

/// One adjustment to the budgets of a category on a given day
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetDelta {
    pub category: String,
    pub amount: f64,
    pub date: NaiveDate,
}

impl BudgetDelta {
    /// The delta a newly stored transaction applies (expenses only)
    pub fn apply(tx: &Transaction) -> Option<Self> {
        let effect = tx.expense_effect();
        if effect == 0.0 {
            return None;
        }
        Some(Self {
            category: tx.category.clone(),
            amount: effect,
            date: tx.date.date(),
        })
    }

    /// The delta that removes a stored transaction's effect
    pub fn undo(tx: &Transaction) -> Option<Self> {
        Self::apply(tx).map(|d| Self {
            amount: -d.amount,
            ..d
        })
    }
}

/// Outcome of the budget side of a ledger write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetSync {
    /// Nothing to reconcile (income, or a no-op change)
    Skipped,
    Applied { budgets_updated: usize },
    /// Reconciliation failed after the write committed
    Failed { reason: String },
}

impl BudgetSync {
    pub(crate) fn from_touched(deltas: &[BudgetDelta], touched: usize) -> Self {
        if deltas.is_empty() {
            Self::Skipped
        } else {
            Self::Applied {
                budgets_updated: touched,
            }
        }
    }

    /// Secondary warning to surface alongside a successful write
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Failed { reason } => Some(format!("budget sync failed: {}", reason)),
            _ => None,
        }
    }
}

/// A committed ledger write plus what happened to the budgets
#[derive(Debug, Clone)]
pub struct LedgerWrite<T> {
    pub value: T,
    pub budget_sync: BudgetSync,
}

impl<T> LedgerWrite<T> {
    pub fn warnings(&self) -> Vec<String> {
        self.budget_sync.warning().into_iter().collect()
    }
}

/// Adjust every budget of `username` in `category` whose window contains
/// `effective_date` by `amount_delta`, clamping at zero
///
/// Returns the number of budgets touched. Empty categories and zero deltas
/// are no-ops.
pub fn reconcile(
    conn: &Connection,
    username: &str,
    category: &str,
    amount_delta: f64,
    effective_date: NaiveDate,
) -> Result<usize> {
    if category.is_empty() || amount_delta == 0.0 {
        return Ok(0);
    }

    let touched = conn.execute(
        r#"
        UPDATE budgets
        SET current_amount = ROUND(MAX(0, current_amount + ?1), 2)
        WHERE username = ?2 AND category = ?3
          AND start_date <= ?4 AND end_date >= ?4
        "#,
        params![amount_delta, username, category, effective_date],
    )?;

    debug!(
        username = %username,
        category = %category,
        delta = amount_delta,
        date = %effective_date,
        touched,
        "Reconciled budgets"
    );

    Ok(touched)
}

/// Apply deltas in order, returning the total number of budget updates
pub(crate) fn apply_all(conn: &Connection, username: &str, deltas: &[BudgetDelta]) -> Result<usize> {
    let mut touched = 0;
    for delta in deltas {
        touched += reconcile(conn, username, &delta.category, delta.amount, delta.date)?;
    }
    Ok(touched)
}

/// Total expense amount in a category over an inclusive window
///
/// Used for the one-time backfill at budget creation and for recomputing a
/// budget from its source transactions.
pub fn window_spending(
    conn: &Connection,
    username: &str,
    category: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<f64> {
    let total: f64 = conn.query_row(
        r#"
        SELECT COALESCE(SUM(ABS(amount)), 0)
        FROM transactions
        WHERE username = ?1 AND category = ?2 AND kind = 'expense'
          AND date(date) BETWEEN ?3 AND ?4
        "#,
        params![username, category, start, end],
        |row| row.get(0),
    )?;
    Ok(crate::models::round2(total))
}
