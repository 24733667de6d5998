//! Transaction command implementations

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tally_core::db::Database;
use tally_core::models::{NewTransaction, TransactionKind, TransactionUpdate};

use super::{format_amount, print_warnings, truncate};

/// Parse a YYYY-MM-DD date as midnight
pub fn parse_date(s: &str) -> Result<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", s))?;
    Ok(date.and_time(NaiveTime::MIN))
}

fn parse_kind(s: &str) -> Result<TransactionKind> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}

pub fn cmd_transactions_list(db: &Database, user: &str, limit: i64) -> Result<()> {
    let transactions = db.list_transactions(user, limit)?;

    if transactions.is_empty() {
        println!("No transactions found. Record one with:");
        println!("  tally transactions add 30 -c dining -d lunch");
        return Ok(());
    }

    println!();
    println!("📝 Recent Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        println!(
            "   [{}] {} │ {:>20} │ {:<14} │ {}",
            tx.id,
            tx.date.format("%Y-%m-%d"),
            format_amount(tx.amount),
            tx.category,
            truncate(&tx.description, 30)
        );
    }

    Ok(())
}

pub fn cmd_transactions_add(
    db: &Database,
    user: &str,
    amount: f64,
    kind: &str,
    category: &str,
    description: Option<&str>,
    date: Option<&str>,
) -> Result<()> {
    let new = NewTransaction {
        amount,
        kind: parse_kind(kind)?,
        category: category.to_string(),
        description: description.map(str::to_string),
        date: date.map(parse_date).transpose()?,
    };

    let write = db.create_transaction(user, &new)?;
    let tx = &write.value;

    println!(
        "✅ Recorded transaction {}: {} {} on {}",
        tx.id,
        format_amount(tx.amount),
        tx.category,
        tx.date.format("%Y-%m-%d")
    );
    print_warnings(&write.warnings());

    Ok(())
}

/// Optional fields for `tally transactions update`
pub struct TransactionEdit<'a> {
    pub amount: Option<f64>,
    pub kind: Option<&'a str>,
    pub category: Option<&'a str>,
    pub description: Option<&'a str>,
    pub date: Option<&'a str>,
}

pub fn cmd_transactions_update(
    db: &Database,
    user: &str,
    id: i64,
    edit: TransactionEdit<'_>,
) -> Result<()> {
    let update = TransactionUpdate {
        amount: edit.amount,
        kind: edit.kind.map(parse_kind).transpose()?,
        category: edit.category.map(str::to_string),
        description: edit.description.map(str::to_string),
        date: edit.date.map(parse_date).transpose()?,
    };
    if update.is_empty() {
        anyhow::bail!("Nothing to update. Pass --amount, --type, --category, --description or --date");
    }

    let write = db.update_transaction(user, id, &update)?;
    let tx = &write.value;

    println!(
        "✅ Updated transaction {}: {} {} on {}",
        tx.id,
        format_amount(tx.amount),
        tx.category,
        tx.date.format("%Y-%m-%d")
    );
    print_warnings(&write.warnings());

    Ok(())
}

pub fn cmd_transactions_delete(db: &Database, user: &str, id: i64) -> Result<()> {
    let write = db.delete_transaction(user, id)?;
    let tx = &write.value;

    println!(
        "🗑️  Deleted transaction {}: {} {}",
        tx.id,
        format_amount(tx.amount),
        tx.category
    );
    print_warnings(&write.warnings());

    Ok(())
}
