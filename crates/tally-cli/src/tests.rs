//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::{Path, PathBuf};

use tally_core::ai::{MockProvider, Provider, Providers};
use tally_core::db::Database;
use tally_core::models::{NewBudget, NewTransaction, Period};
use tally_core::{ChatService, PromptLibrary};

use crate::commands::{self, truncate, TransactionEdit};

const USER: &str = "alice";

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_default_categories().unwrap();
    db
}

fn dining_budget(db: &Database) -> i64 {
    db.create_budget(
        USER,
        &NewBudget {
            name: "Eating out".into(),
            target_amount: 800.0,
            category: "dining".into(),
            period: Some(Period::Month),
        },
    )
    .unwrap()
    .id
}

fn no_edit() -> TransactionEdit<'static> {
    TransactionEdit {
        amount: None,
        kind: None,
        category: None,
        description: None,
        date: None,
    }
}

// ========== Setup Tests ==========

#[test]
fn test_cmd_init_seeds_categories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tally.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert!(db.resolve_category("dining").unwrap().is_some());

    // Running init again adds nothing
    assert_eq!(commands::seed_categories(&db).unwrap(), 0);
}

#[test]
fn test_resolve_db_path_explicit() {
    let path = commands::resolve_db_path(Some(Path::new("custom.db")));
    assert_eq!(path, PathBuf::from("custom.db"));
}

#[test]
fn test_resolve_user_explicit() {
    assert_eq!(commands::resolve_user(Some("bob")), "bob");
    assert_eq!(commands::resolve_user(Some("  carol ")), "carol");
}

// ========== Transaction Command Tests ==========

#[test]
fn test_cmd_transactions_add_updates_budget() {
    let db = setup_test_db();
    let budget = dining_budget(&db);

    commands::cmd_transactions_add(&db, USER, 30.0, "expense", "dining", Some("lunch"), None)
        .unwrap();

    let txs = db.list_transactions(USER, 10).unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].amount, -30.0);
    assert_eq!(txs[0].description, "lunch");
    assert_eq!(
        db.get_budget(USER, budget).unwrap().unwrap().current_amount,
        30.0
    );
}

#[test]
fn test_cmd_transactions_add_with_date() {
    let db = setup_test_db();

    commands::cmd_transactions_add(&db, USER, 3000.0, "income", "salary", None, Some("2024-03-15"))
        .unwrap();

    let tx = &db.list_transactions(USER, 1).unwrap()[0];
    assert_eq!(tx.amount, 3000.0);
    assert_eq!(tx.date.format("%Y-%m-%d").to_string(), "2024-03-15");
}

#[test]
fn test_cmd_transactions_add_rejects_bad_input() {
    let db = setup_test_db();

    assert!(commands::cmd_transactions_add(&db, USER, 5.0, "transfer", "dining", None, None).is_err());
    assert!(commands::cmd_transactions_add(&db, USER, 5.0, "expense", "dining", None, Some("15/03/2024")).is_err());
    assert!(commands::cmd_transactions_add(&db, USER, 0.0, "expense", "dining", None, None).is_err());
    assert_eq!(db.count_transactions(USER).unwrap(), 0);
}

#[test]
fn test_cmd_transactions_update_and_delete() {
    let db = setup_test_db();
    let budget = dining_budget(&db);
    let id = db
        .create_transaction(USER, &NewTransaction::expense(40.0, "dining"))
        .unwrap()
        .value
        .id;

    commands::cmd_transactions_update(
        &db,
        USER,
        id,
        TransactionEdit {
            amount: Some(25.0),
            ..no_edit()
        },
    )
    .unwrap();
    assert_eq!(db.get_transaction(USER, id).unwrap().unwrap().amount, -25.0);
    assert_eq!(
        db.get_budget(USER, budget).unwrap().unwrap().current_amount,
        25.0
    );

    // An empty edit is refused
    assert!(commands::cmd_transactions_update(&db, USER, id, no_edit()).is_err());

    // Other users cannot delete it
    assert!(commands::cmd_transactions_delete(&db, "bob", id).is_err());

    commands::cmd_transactions_delete(&db, USER, id).unwrap();
    assert!(db.get_transaction(USER, id).unwrap().is_none());
    assert_eq!(
        db.get_budget(USER, budget).unwrap().unwrap().current_amount,
        0.0
    );
}

#[test]
fn test_cmd_transactions_list() {
    let db = setup_test_db();
    assert!(commands::cmd_transactions_list(&db, USER, 10).is_ok());

    db.create_transaction(USER, &NewTransaction::expense(12.0, "transport"))
        .unwrap();
    assert!(commands::cmd_transactions_list(&db, USER, 10).is_ok());
}

// ========== Budget Command Tests ==========

#[test]
fn test_cmd_budgets_add_backfills() {
    let db = setup_test_db();
    for amount in [30.0, 20.0, 50.0] {
        db.create_transaction(USER, &NewTransaction::expense(amount, "dining"))
            .unwrap();
    }

    commands::cmd_budgets_add(&db, USER, "Dining", 300.0, "Dining", "quarter").unwrap();

    let budgets = db.list_budgets(USER).unwrap();
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0].current_amount, 100.0);
    assert_eq!(budgets[0].period, Period::Quarter);
    assert_eq!(budgets[0].category, "dining");
}

#[test]
fn test_cmd_budgets_add_rejects_bad_input() {
    let db = setup_test_db();
    assert!(commands::cmd_budgets_add(&db, USER, "Weekly", 50.0, "dining", "week").is_err());
    assert!(commands::cmd_budgets_add(&db, USER, "Pets", 50.0, "pets", "month").is_err());
    assert!(commands::cmd_budgets_add(&db, USER, "Zero", 0.0, "dining", "month").is_err());
    assert!(db.list_budgets(USER).unwrap().is_empty());
}

#[test]
fn test_cmd_budgets_update_delete_recompute() {
    let db = setup_test_db();
    let id = dining_budget(&db);
    db.create_transaction(USER, &NewTransaction::expense(60.0, "dining"))
        .unwrap();

    commands::cmd_budgets_update(&db, USER, id, Some("Food"), Some(900.0)).unwrap();
    let budget = db.get_budget(USER, id).unwrap().unwrap();
    assert_eq!(budget.name, "Food");
    assert_eq!(budget.target_amount, 900.0);
    assert!(commands::cmd_budgets_update(&db, USER, id, None, None).is_err());

    db.conn()
        .unwrap()
        .execute("UPDATE budgets SET current_amount = 0 WHERE id = ?", [id])
        .unwrap();
    commands::cmd_budgets_recompute(&db, USER, id).unwrap();
    assert_eq!(db.get_budget(USER, id).unwrap().unwrap().current_amount, 60.0);

    commands::cmd_budgets_delete(&db, USER, id).unwrap();
    assert!(db.get_budget(USER, id).unwrap().is_none());
    assert!(commands::cmd_budgets_delete(&db, USER, id).is_err());
    assert!(commands::cmd_budgets_list(&db, USER).is_ok());
}

// ========== Category Command Tests ==========

#[test]
fn test_cmd_categories() {
    let db = setup_test_db();

    commands::cmd_categories_add(&db, "pets").unwrap();
    assert!(commands::cmd_categories_add(&db, "Pets").is_err());

    let pets = db.resolve_category("pets").unwrap().unwrap();
    commands::cmd_categories_rename(&db, pets.id, "pet care").unwrap();
    assert_eq!(db.get_category(pets.id).unwrap().unwrap().name, "pet care");

    commands::cmd_categories_delete(&db, pets.id).unwrap();
    assert!(db.get_category(pets.id).unwrap().is_none());
    assert!(commands::cmd_categories_delete(&db, pets.id).is_err());
    assert!(commands::cmd_categories_list(&db).is_ok());
}

// ========== Report Command Tests ==========

#[test]
fn test_cmd_summary_and_report() {
    let db = setup_test_db();
    db.create_transaction(USER, &NewTransaction::expense(580.0, "dining"))
        .unwrap();
    db.create_transaction(USER, &NewTransaction::income(3000.0, "salary"))
        .unwrap();

    assert!(commands::cmd_summary(&db, USER).is_ok());
    assert!(commands::cmd_report(&db, USER, "month").is_ok());
    assert!(commands::cmd_report(&db, USER, "yearly").is_ok());
    assert!(commands::cmd_report(&db, USER, "week").is_err());
}

// ========== Chat Command Tests ==========

#[test]
fn test_cmd_quick_records_and_logs() {
    let db = setup_test_db();
    let budget = dining_budget(&db);

    commands::cmd_quick(&db, USER, "lunch 30 yuan").unwrap();
    assert_eq!(
        db.get_budget(USER, budget).unwrap().unwrap().current_amount,
        30.0
    );

    commands::cmd_quick(&db, USER, "what did I spend?").unwrap();
    assert_eq!(db.count_transactions(USER).unwrap(), 1);

    let history = db.chat_history(USER, 10).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].content, "lunch 30 yuan");
    assert!(commands::cmd_history(&db, USER, 10).is_ok());
}

#[tokio::test]
async fn test_cmd_chat_with_mock_provider() {
    let db = setup_test_db();
    let primary = MockProvider::new()
        .reply(r#"{"thought": "taxi is transport", "status": "true", "tool_names": "create_transaction", "args_list": {"create_transaction": {"data": {"amount": 18, "type": "expense", "category": "transport"}}}}"#)
        .reply("Recorded 18.00 for transport.");
    let providers = Providers::from_chain(Provider::new("primary", primary.clone()), None);
    let service = ChatService::new(db.clone(), providers, PromptLibrary::embedded().unwrap());

    commands::cmd_chat(&service, USER, "taxi 18 yuan", None)
        .await
        .unwrap();

    assert_eq!(primary.call_count(), 2);
    let txs = db.list_transactions(USER, 1).unwrap();
    assert_eq!(txs[0].amount, -18.0);
    assert_eq!(txs[0].category, "transport");

    // Unknown provider override is an error
    assert!(commands::cmd_chat(&service, USER, "hi", Some("nope"))
        .await
        .is_err());
}

#[test]
fn test_cmd_tools() {
    assert!(commands::cmd_tools().is_ok());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long description", 10), "a long ...");
    assert_eq!(truncate("午餐午餐午餐", 5), "午餐...");
}

#[test]
fn test_parse_date() {
    let date = commands::parse_date("2024-02-29").unwrap();
    assert_eq!(date.to_string(), "2024-02-29 00:00:00");
    assert!(commands::parse_date("2024-02-30").is_err());
}
