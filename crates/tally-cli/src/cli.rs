//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Keep your books by chatting
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Conversational expense tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    ///
    /// Defaults to tally.db, or to the profile's path (db/dev.db, db/test.db,
    /// db/prod.db) when TALLY_ENV is set.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Acting username (defaults to TALLY_USER, else "local")
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the default categories
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires the x-tally-user header set by a
        /// reverse proxy, or a bearer key from TALLY_API_KEYS.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Send a message to the assistant
    Chat {
        /// The message, e.g. "lunch 30 yuan"
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Provider to try first instead of the configured primary
        #[arg(long)]
        provider: Option<String>,
    },

    /// Record or query without a model, using the keyword parser
    Quick {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Show income, expense and balance for this month
    Summary,

    /// Manage transactions (list, add, update, delete)
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Manage budgets (list, add, update, delete, recompute)
    Budgets {
        #[command(subcommand)]
        action: Option<BudgetsAction>,
    },

    /// Manage categories (list, add, rename, delete)
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Spending by category for the current month, quarter or year
    Report {
        /// month, quarter or year
        #[arg(short, long, default_value = "month")]
        range: String,
    },

    /// Show recent chat messages
    History {
        #[arg(short, long, default_value = "5")]
        limit: i64,
    },

    /// List the tools the assistant can call
    Tools,

    /// List configured completion providers
    Providers {
        /// Also check that each provider is reachable
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List recent transactions
    List {
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Record a transaction
    Add {
        /// Amount (sign is ignored; the type decides it)
        amount: f64,

        /// Category name
        #[arg(short, long)]
        category: String,

        /// expense or income
        #[arg(short = 't', long = "type", default_value = "expense")]
        kind: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Date (YYYY-MM-DD), defaults to now
        #[arg(long)]
        date: Option<String>,
    },

    /// Change fields of a transaction
    Update {
        id: i64,

        #[arg(short, long)]
        amount: Option<f64>,

        #[arg(short, long)]
        category: Option<String>,

        /// expense or income
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a transaction
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum BudgetsAction {
    /// List budgets
    List,

    /// Create a budget, counting existing expenses in its window
    Add {
        name: String,

        /// Target amount
        target: f64,

        #[arg(short, long)]
        category: String,

        /// Window: month, quarter or year
        #[arg(short = 't', long = "type", default_value = "month")]
        period: String,
    },

    /// Rename a budget or change its target
    Update {
        id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        target: Option<f64>,
    },

    /// Delete a budget
    Delete { id: i64 },

    /// Rebuild a budget's running total from the ledger
    Recompute { id: i64 },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category
    Add { name: String },

    /// Rename a category
    Rename { id: i64, name: String },

    /// Delete a category (transactions keep the name)
    Delete { id: i64 },
}
