//! Budget command implementations

use anyhow::Result;
use tally_core::db::Database;
use tally_core::models::{Budget, BudgetUpdate, NewBudget, Period};

fn print_budget(budget: &Budget) {
    let pct = if budget.target_amount > 0.0 {
        budget.current_amount / budget.target_amount * 100.0
    } else {
        0.0
    };
    let marker = if budget.current_amount > budget.target_amount {
        "🔴"
    } else if pct >= 80.0 {
        "🟡"
    } else {
        "🟢"
    };
    println!(
        "   {} [{}] {:<20} │ {:<14} │ {:>10.2} / {:<10.2} │ {} → {}",
        marker,
        budget.id,
        budget.name,
        budget.category,
        budget.current_amount,
        budget.target_amount,
        budget.start_date,
        budget.end_date
    );
}

pub fn cmd_budgets_list(db: &Database, user: &str) -> Result<()> {
    let budgets = db.list_budgets(user)?;

    if budgets.is_empty() {
        println!("No budgets yet. Create one with:");
        println!("  tally budgets add \"Eating out\" 800 -c dining");
        return Ok(());
    }

    println!();
    println!("🎯 Budgets");
    println!("   ─────────────────────────────────────────────────────────────");
    for budget in &budgets {
        print_budget(budget);
    }

    Ok(())
}

pub fn cmd_budgets_add(
    db: &Database,
    user: &str,
    name: &str,
    target: f64,
    category: &str,
    period: &str,
) -> Result<()> {
    let period: Period = period.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let budget = db.create_budget(
        user,
        &NewBudget {
            name: name.to_string(),
            target_amount: target,
            category: category.to_string(),
            period: Some(period),
        },
    )?;

    println!("✅ Created budget {}:", budget.id);
    print_budget(&budget);

    Ok(())
}

pub fn cmd_budgets_update(
    db: &Database,
    user: &str,
    id: i64,
    name: Option<&str>,
    target: Option<f64>,
) -> Result<()> {
    if name.is_none() && target.is_none() {
        anyhow::bail!("Nothing to update. Pass --name or --target");
    }

    let budget = db.update_budget(
        user,
        id,
        &BudgetUpdate {
            name: name.map(str::to_string),
            target_amount: target,
        },
    )?;

    println!("✅ Updated budget {}:", budget.id);
    print_budget(&budget);

    Ok(())
}

pub fn cmd_budgets_delete(db: &Database, user: &str, id: i64) -> Result<()> {
    db.delete_budget(user, id)?;
    println!("🗑️  Deleted budget {}", id);
    Ok(())
}

pub fn cmd_budgets_recompute(db: &Database, user: &str, id: i64) -> Result<()> {
    let before = db
        .get_budget(user, id)?
        .ok_or_else(|| anyhow::anyhow!("Budget {} not found", id))?;
    let after = db.recompute_budget(user, id)?;

    if (before.current_amount - after.current_amount).abs() < 0.005 {
        println!("✅ Budget {} was already consistent", id);
    } else {
        println!(
            "✅ Budget {} corrected: {:.2} → {:.2}",
            id, before.current_amount, after.current_amount
        );
    }
    print_budget(&after);

    Ok(())
}
