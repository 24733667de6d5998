//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `chat` - Assistant chat, quick entry and history
//! - `transactions` - Transaction commands (list, add, update, delete)
//! - `budgets` - Budget commands (list, add, update, delete, recompute)
//! - `categories` - Category commands (list, add, rename, delete)
//! - `reports` - Monthly summary and spending report
//! - `providers` - Function registry and completion provider listing
//! - `serve` - Web server command
//! - `setup` - Init and shared utilities (open_db, resolve_db_path, resolve_user)

pub mod budgets;
pub mod categories;
pub mod chat;
pub mod providers;
pub mod reports;
pub mod serve;
pub mod setup;
pub mod transactions;

// Re-export command functions for main.rs
pub use budgets::*;
pub use categories::*;
pub use chat::*;
pub use providers::*;
pub use reports::*;
pub use serve::*;
pub use setup::*;
pub use transactions::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Colour a signed amount: red for expenses, green for income
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[31m-{:.2}\x1b[0m", amount.abs())
    } else {
        format!("\x1b[32m+{:.2}\x1b[0m", amount)
    }
}

/// Print budget sync and persistence warnings
pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("   ⚠️  {}", warning);
    }
}
