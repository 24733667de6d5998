//! Tally CLI - Conversational expense tracker
//!
//! Usage:
//!   tally init                       Initialize database
//!   tally chat lunch 30 yuan         Talk to the assistant
//!   tally quick lunch 30 yuan        Record without a model
//!   tally budgets add Food 800 -c dining
//!   tally serve --port 3000          Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = commands::resolve_db_path(cli.db.as_deref());
    let user = commands::resolve_user(cli.user.as_deref());

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => {
            commands::cmd_serve(
                &db_path,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Chat { message, provider } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            let service = commands::load_chat_service(&db)?;
            commands::cmd_chat(&service, &user, &message.join(" "), provider.as_deref()).await
        }
        Commands::Quick { message } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_quick(&db, &user, &message.join(" "))
        }
        Commands::Summary => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_summary(&db, &user)
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, &user, 10),
                Some(TransactionsAction::List { limit }) => {
                    commands::cmd_transactions_list(&db, &user, limit)
                }
                Some(TransactionsAction::Add {
                    amount,
                    category,
                    kind,
                    description,
                    date,
                }) => commands::cmd_transactions_add(
                    &db,
                    &user,
                    amount,
                    &kind,
                    &category,
                    description.as_deref(),
                    date.as_deref(),
                ),
                Some(TransactionsAction::Update {
                    id,
                    amount,
                    category,
                    kind,
                    description,
                    date,
                }) => commands::cmd_transactions_update(
                    &db,
                    &user,
                    id,
                    commands::TransactionEdit {
                        amount,
                        kind: kind.as_deref(),
                        category: category.as_deref(),
                        description: description.as_deref(),
                        date: date.as_deref(),
                    },
                ),
                Some(TransactionsAction::Delete { id }) => {
                    commands::cmd_transactions_delete(&db, &user, id)
                }
            }
        }
        Commands::Budgets { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(BudgetsAction::List) => commands::cmd_budgets_list(&db, &user),
                Some(BudgetsAction::Add {
                    name,
                    target,
                    category,
                    period,
                }) => commands::cmd_budgets_add(&db, &user, &name, target, &category, &period),
                Some(BudgetsAction::Update { id, name, target }) => {
                    commands::cmd_budgets_update(&db, &user, id, name.as_deref(), target)
                }
                Some(BudgetsAction::Delete { id }) => commands::cmd_budgets_delete(&db, &user, id),
                Some(BudgetsAction::Recompute { id }) => {
                    commands::cmd_budgets_recompute(&db, &user, id)
                }
            }
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add { name }) => commands::cmd_categories_add(&db, &name),
                Some(CategoriesAction::Rename { id, name }) => {
                    commands::cmd_categories_rename(&db, id, &name)
                }
                Some(CategoriesAction::Delete { id }) => commands::cmd_categories_delete(&db, id),
            }
        }
        Commands::Report { range } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_report(&db, &user, &range)
        }
        Commands::History { limit } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_history(&db, &user, limit)
        }
        Commands::Tools => commands::cmd_tools(),
        Commands::Providers { check } => commands::cmd_providers(check).await,
    }
}
