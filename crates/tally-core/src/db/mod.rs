//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Transaction CRUD with budget reconciliation
//! - `budgets` - Budget creation (with backfill), edits and recompute
//! - `categories` - Global category list with case-insensitive uniqueness
//! - `chats` - Append-only conversation log
//! - `reports` - Monthly summary and spending reports
//! - `audit` - Audit trail for API mutations

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::reconcile::{self, BudgetDelta, BudgetSync, LedgerWrite, ReconcilePolicy};

mod audit;
mod budgets;
mod categories;
mod chats;
mod reports;
mod transactions;

pub use audit::AuditEntry;
pub use categories::DEFAULT_CATEGORIES;
pub use chats::DEFAULT_HISTORY_LIMIT;
pub use transactions::DEFAULT_TRANSACTION_LIMIT;

pub(crate) use transactions::now;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Upper bound for list queries
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-ok";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite `CURRENT_TIMESTAMP` string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    reconcile_policy: ReconcilePolicy,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` to be set. Use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?);
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });
            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            reconcile_policy: ReconcilePolicy::default(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create a throw-away database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Use a different reconciliation policy for transaction writes
    pub fn with_reconcile_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.reconcile_policy = policy;
        self
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        self.reconcile_policy
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run a ledger write and the budget adjustments it implies
    ///
    /// `write` performs the row changes inside a SQLite transaction and
    /// returns the deltas to reconcile. Under `Atomic` both happen in that
    /// same transaction. Under `BestEffort` the write commits first and a
    /// reconciliation failure is reported through `BudgetSync::Failed`.
    pub(crate) fn write_with_reconcile<T>(
        &self,
        username: &str,
        write: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<(T, Vec<BudgetDelta>)>,
    ) -> Result<LedgerWrite<T>> {
        let mut conn = self.conn()?;

        match self.reconcile_policy {
            ReconcilePolicy::Atomic => {
                let tx = conn.transaction()?;
                let (value, deltas) = write(&tx)?;
                let touched = reconcile::apply_all(&tx, username, &deltas)?;
                tx.commit()?;
                Ok(LedgerWrite {
                    value,
                    budget_sync: BudgetSync::from_touched(&deltas, touched),
                })
            }
            ReconcilePolicy::BestEffort => {
                let tx = conn.transaction()?;
                let (value, deltas) = write(&tx)?;
                tx.commit()?;

                let synced = conn.transaction().map_err(Error::from).and_then(|tx| {
                    let touched = reconcile::apply_all(&tx, username, &deltas)?;
                    tx.commit()?;
                    Ok(touched)
                });

                let budget_sync = match synced {
                    Ok(touched) => BudgetSync::from_touched(&deltas, touched),
                    Err(e) => {
                        warn!(
                            username = %username,
                            error = %e,
                            "Budget reconciliation failed after transaction commit"
                        );
                        BudgetSync::Failed {
                            reason: e.to_string(),
                        }
                    }
                };

                Ok(LedgerWrite { value, budget_sync })
            }
        }
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Transactions (expense amounts stored negative, income positive)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                amount REAL NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('expense', 'income')),
                category TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                date DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(username, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_category ON transactions(username, category);

            -- Budgets: current_amount is a cached aggregate owned by the reconciliation engine
            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                name TEXT NOT NULL,
                target_amount REAL NOT NULL,
                current_amount REAL NOT NULL DEFAULT 0 CHECK (current_amount >= 0),
                category TEXT NOT NULL,
                period TEXT NOT NULL DEFAULT 'month',
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_budgets_user_category ON budgets(username, category);

            -- Categories are global and referenced by name (no cascade on delete)
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Conversation log: direction 1 = user, 0 = agent
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                content TEXT NOT NULL,
                direction INTEGER NOT NULL,
                date DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chats_user_date ON chats(username, date);

            -- Audit log (tracks API mutations)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                username TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(username);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!(path = %self.db_path, "Database schema initialized");
        Ok(())
    }
}
