//! Monthly summary and spending reports

use chrono::{Local, NaiveDate};
use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{round2, CategoryAmount, MonthlySummary, Period, SpendingReport};

impl Database {
    /// Income and expense totals for the current calendar month
    pub fn monthly_summary(&self, username: &str) -> Result<MonthlySummary> {
        self.monthly_summary_on(username, Local::now().date_naive())
    }

    /// Totals for the calendar month containing `today`
    pub fn monthly_summary_on(&self, username: &str, today: NaiveDate) -> Result<MonthlySummary> {
        let (start, end) = Period::Month.window(today);
        let conn = self.conn()?;

        let (income, expense): (f64, f64) = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'income' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount END), 0)
            FROM transactions
            WHERE username = ? AND date(date) BETWEEN ? AND ?
            "#,
            params![username, start, end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(MonthlySummary {
            income: round2(income),
            expense: round2(expense),
            balance: round2(income + expense),
        })
    }

    /// Expense magnitudes per category over an inclusive window, largest first
    pub fn category_spending(
        &self,
        username: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CategoryAmount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT category, SUM(ABS(amount)) AS spent
            FROM transactions
            WHERE username = ? AND kind = 'expense' AND date(date) BETWEEN ? AND ?
            GROUP BY category
            ORDER BY spent DESC, category ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![username, start, end], |row| {
                Ok(CategoryAmount {
                    name: row.get(0)?,
                    amount: round2(row.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Spending by category for the current month, quarter or year
    pub fn spending_report(&self, username: &str, range: Period) -> Result<SpendingReport> {
        self.spending_report_on(username, range, Local::now().date_naive())
    }

    pub fn spending_report_on(
        &self,
        username: &str,
        range: Period,
        today: NaiveDate,
    ) -> Result<SpendingReport> {
        let (start, end) = range.window(today);
        let categories = self.category_spending(username, start, end)?;
        let total = round2(categories.iter().map(|c| c.amount).sum());

        Ok(SpendingReport {
            title: format!("Spending by category {}", range.label()),
            range,
            total,
            categories,
        })
    }
}
