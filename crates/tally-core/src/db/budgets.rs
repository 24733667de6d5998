//! Budget operations

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Budget, BudgetUpdate, NewBudget};
use crate::reconcile;

const BUDGET_COLUMNS: &str =
    "id, username, name, target_amount, current_amount, category, period, start_date, end_date, created_at";

fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
    let period: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(Budget {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        target_amount: row.get(3)?,
        current_amount: row.get(4)?,
        category: row.get(5)?,
        period: period.parse().unwrap_or_default(),
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

fn fetch_budget(conn: &Connection, username: &str, id: i64) -> Result<Option<Budget>> {
    let sql = format!(
        "SELECT {} FROM budgets WHERE id = ? AND username = ?",
        BUDGET_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id, username], row_to_budget)
        .optional()?)
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Budget {} not found", id))
}

fn validate_target(target: f64) -> Result<()> {
    if !target.is_finite() || target <= 0.0 {
        return Err(Error::InvalidData(format!(
            "target_amount must be positive, got {}",
            target
        )));
    }
    Ok(())
}

impl Database {
    /// Create a budget for the current period window
    pub fn create_budget(&self, username: &str, new: &NewBudget) -> Result<Budget> {
        self.create_budget_on(username, new, Local::now().date_naive())
    }

    /// Create a budget whose window is the period containing `today`
    ///
    /// The category must exist. `current_amount` starts at the expenses
    /// already recorded in the window.
    pub fn create_budget_on(
        &self,
        username: &str,
        new: &NewBudget,
        today: NaiveDate,
    ) -> Result<Budget> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("budget name is required".into()));
        }
        validate_target(new.target_amount)?;

        let category = self
            .resolve_category(&new.category)?
            .ok_or_else(|| Error::InvalidData(format!("Unknown category: {}", new.category)))?;

        let period = new.period.unwrap_or_default();
        let (start, end) = period.window(today);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let backfill = reconcile::window_spending(&tx, username, &category.name, start, end)?;
        tx.execute(
            r#"
            INSERT INTO budgets (username, name, target_amount, current_amount, category, period, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                username,
                name,
                new.target_amount,
                backfill,
                category.name,
                period.as_str(),
                start,
                end
            ],
        )?;
        let id = tx.last_insert_rowid();
        let budget = fetch_budget(&tx, username, id)?.ok_or_else(|| not_found(id))?;
        tx.commit()?;

        info!(
            username = %username,
            budget_id = id,
            category = %budget.category,
            backfill,
            "Created budget"
        );
        Ok(budget)
    }

    pub fn get_budget(&self, username: &str, id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        fetch_budget(&conn, username, id)
    }

    /// Budgets for a user, most recent window first
    pub fn list_budgets(&self, username: &str) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM budgets WHERE username = ? ORDER BY start_date DESC, id DESC",
            BUDGET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let budgets = stmt
            .query_map(params![username], row_to_budget)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(budgets)
    }

    /// Rename a budget or change its target; category and window are fixed
    pub fn update_budget(&self, username: &str, id: i64, update: &BudgetUpdate) -> Result<Budget> {
        let existing = self.get_budget(username, id)?.ok_or_else(|| not_found(id))?;

        let name = match &update.name {
            Some(n) if n.trim().is_empty() => {
                return Err(Error::InvalidData("budget name cannot be empty".into()))
            }
            Some(n) => n.trim().to_string(),
            None => existing.name,
        };
        let target = update.target_amount.unwrap_or(existing.target_amount);
        validate_target(target)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE budgets SET name = ?, target_amount = ? WHERE id = ? AND username = ?",
            params![name, target, id, username],
        )?;

        fetch_budget(&conn, username, id)?.ok_or_else(|| not_found(id))
    }

    pub fn delete_budget(&self, username: &str, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM budgets WHERE id = ? AND username = ?",
            params![id, username],
        )?;
        if deleted == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Re-derive `current_amount` from the transactions in the budget's window
    ///
    /// Repairs drift left behind by the zero clamp on out-of-order edits.
    pub fn recompute_budget(&self, username: &str, id: i64) -> Result<Budget> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let budget = fetch_budget(&tx, username, id)?.ok_or_else(|| not_found(id))?;
        let actual = reconcile::window_spending(
            &tx,
            username,
            &budget.category,
            budget.start_date,
            budget.end_date,
        )?;
        tx.execute(
            "UPDATE budgets SET current_amount = ? WHERE id = ?",
            params![actual, id],
        )?;
        let budget = fetch_budget(&tx, username, id)?.ok_or_else(|| not_found(id))?;
        tx.commit()?;

        Ok(budget)
    }
}
