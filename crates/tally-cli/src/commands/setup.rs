//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `resolve_db_path` / `resolve_user` - Global flag defaults
//! - `cmd_init` - Initialize the database

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_core::config::{Profile, PROFILE_ENV};
use tally_core::db::Database;

/// Environment variable naming the acting user
pub const USER_ENV: &str = "TALLY_USER";

/// Database path when neither --db nor TALLY_ENV is given
pub const DEFAULT_DB_PATH: &str = "tally.db";

/// Pick the database path: --db, then the TALLY_ENV profile, then tally.db
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if std::env::var(PROFILE_ENV).is_ok() {
        return PathBuf::from(Profile::from_env().default_db_path());
    }
    PathBuf::from(DEFAULT_DB_PATH)
}

/// Pick the acting user: --user, then TALLY_USER, then "local"
pub fn resolve_user(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(USER_ENV).ok())
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    seed_categories(&db)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Create a budget: tally budgets add \"Eating out\" 800 -c dining");
    println!("  2. Record something: tally chat lunch 30 yuan");
    println!("  3. Start web UI: tally serve");

    Ok(())
}

/// Seed default categories (idempotent)
pub fn seed_categories(db: &Database) -> Result<usize> {
    let added = db
        .seed_default_categories()
        .context("Failed to seed default categories")?;
    if added > 0 {
        println!("   Seeded {} default categories", added);
    }
    Ok(added)
}
