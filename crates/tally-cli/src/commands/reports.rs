//! Report command implementations

use anyhow::Result;
use tally_core::db::Database;
use tally_core::models::Period;

pub fn cmd_summary(db: &Database, user: &str) -> Result<()> {
    let summary = db.monthly_summary(user)?;

    println!();
    println!("📊 This Month");
    println!("   ─────────────────────────────");
    println!("   Income:  {:>12.2}", summary.income);
    println!("   Expense: {:>12.2}", summary.expense);
    println!("   Balance: {:>12.2}", summary.balance);

    Ok(())
}

pub fn cmd_report(db: &Database, user: &str, range: &str) -> Result<()> {
    let range: Period = range.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let report = db.spending_report(user, range)?;

    println!();
    println!("📊 {}", report.title);
    println!("   ─────────────────────────────");

    if report.categories.is_empty() {
        println!("   No expenses recorded {}.", range.label());
        return Ok(());
    }

    for category in &report.categories {
        let pct = if report.total > 0.0 {
            category.amount / report.total * 100.0
        } else {
            0.0
        };
        println!(
            "   {:<16} {:>10.2}  ({:>5.1}%)",
            category.name, category.amount, pct
        );
    }
    println!("   ─────────────────────────────");
    println!("   {:<16} {:>10.2}", "Total", report.total);

    Ok(())
}
