//! Transaction operations

use chrono::{Local, NaiveDateTime, SubsecRound};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime, Database, MAX_LIST_LIMIT};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction, TransactionKind, TransactionUpdate};
use crate::reconcile::{BudgetDelta, LedgerWrite};

const TRANSACTION_COLUMNS: &str =
    "id, username, amount, kind, category, description, date, created_at";

/// Default page size for `list_transactions`
pub const DEFAULT_TRANSACTION_LIMIT: i64 = 10;

pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let kind: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    Ok(Transaction {
        id: row.get(0)?,
        username: row.get(1)?,
        amount: row.get(2)?,
        kind: kind.parse().unwrap_or(TransactionKind::Expense),
        category: row.get(4)?,
        description: row.get(5)?,
        date: row.get(6)?,
        created_at: parse_datetime(&created_at),
    })
}

fn fetch_transaction(conn: &Connection, username: &str, id: i64) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE id = ? AND username = ?",
        TRANSACTION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id, username], row_to_transaction)
        .optional()?)
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Transaction {} not found", id))
}

impl Database {
    /// Record a transaction and reconcile the budgets it falls into
    pub fn create_transaction(
        &self,
        username: &str,
        new: &NewTransaction,
    ) -> Result<LedgerWrite<Transaction>> {
        new.validate()?;

        let amount = new.kind.normalize(new.amount);
        let date = new.date.unwrap_or_else(now);
        let category = new.category.trim().to_string();
        let description = new.description.clone().unwrap_or_default();

        self.write_with_reconcile(username, |conn| {
            conn.execute(
                r#"
                INSERT INTO transactions (username, amount, kind, category, description, date)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                params![
                    username,
                    amount,
                    new.kind.as_str(),
                    category,
                    description,
                    date
                ],
            )?;

            let id = conn.last_insert_rowid();
            let tx = fetch_transaction(conn, username, id)?.ok_or_else(|| not_found(id))?;
            let deltas = BudgetDelta::apply(&tx).into_iter().collect();
            Ok((tx, deltas))
        })
    }

    /// Get a transaction owned by `username`
    pub fn get_transaction(&self, username: &str, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        fetch_transaction(&conn, username, id)
    }

    /// Most recent transactions first
    pub fn list_transactions(&self, username: &str, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE username = ? ORDER BY date DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(
                params![username, limit.clamp(1, MAX_LIST_LIMIT)],
                row_to_transaction,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(transactions)
    }

    /// Apply a partial update, undoing the old budget effect and applying the new one
    pub fn update_transaction(
        &self,
        username: &str,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<LedgerWrite<Transaction>> {
        if update.is_empty() {
            return Err(Error::InvalidData("no fields to update".into()));
        }

        self.write_with_reconcile(username, |conn| {
            let old = fetch_transaction(conn, username, id)?.ok_or_else(|| not_found(id))?;
            let merged = update.apply_to(&old)?;

            conn.execute(
                r#"
                UPDATE transactions
                SET amount = ?, kind = ?, category = ?, description = ?, date = ?
                WHERE id = ? AND username = ?
                "#,
                params![
                    merged.amount,
                    merged.kind.as_str(),
                    merged.category,
                    merged.description,
                    merged.date,
                    id,
                    username
                ],
            )?;

            let deltas = BudgetDelta::undo(&old)
                .into_iter()
                .chain(BudgetDelta::apply(&merged))
                .collect();
            Ok((merged, deltas))
        })
    }

    /// Delete a transaction and remove its budget effect
    pub fn delete_transaction(&self, username: &str, id: i64) -> Result<LedgerWrite<Transaction>> {
        self.write_with_reconcile(username, |conn| {
            let old = fetch_transaction(conn, username, id)?.ok_or_else(|| not_found(id))?;
            conn.execute(
                "DELETE FROM transactions WHERE id = ? AND username = ?",
                params![id, username],
            )?;
            let deltas = BudgetDelta::undo(&old).into_iter().collect();
            Ok((old, deltas))
        })
    }

    /// Count transactions for a user
    pub fn count_transactions(&self, username: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE username = ?",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
