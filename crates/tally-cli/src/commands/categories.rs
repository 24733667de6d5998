//! Category command implementations

use anyhow::Result;
use tally_core::db::Database;

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = db.list_categories()?;

    if categories.is_empty() {
        println!("No categories. Run 'tally init' to seed the defaults.");
        return Ok(());
    }

    println!();
    println!("🏷️  Categories");
    for category in categories {
        println!("   [{}] {}", category.id, category.name);
    }

    Ok(())
}

pub fn cmd_categories_add(db: &Database, name: &str) -> Result<()> {
    let category = db.add_category(name)?;
    println!("✅ Added category [{}] {}", category.id, category.name);
    Ok(())
}

pub fn cmd_categories_rename(db: &Database, id: i64, name: &str) -> Result<()> {
    let category = db.update_category(id, name)?;
    println!("✅ Renamed category [{}] to {}", category.id, category.name);
    println!("   Existing transactions and budgets keep the old name.");
    Ok(())
}

pub fn cmd_categories_delete(db: &Database, id: i64) -> Result<()> {
    let category = db.delete_category(id)?;
    println!("🗑️  Deleted category [{}] {}", category.id, category.name);
    Ok(())
}
