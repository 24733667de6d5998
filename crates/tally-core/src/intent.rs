//! Heuristic intent parser
//!
//! A deterministic path that needs no model: a message with an amount
//! followed by a currency marker ("lunch 30 yuan", "打车 25元", "$12") is a
//! request to record an expense; anything else is a query answered with a
//! month-to-date summary. Classification is pure and total.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{CategoryAmount, NewTransaction, Period};

/// Amount followed by a currency marker
static AMOUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:元|块|yuan|rmb|dollars?|usd|¥|\$)")
        .expect("valid regex")
});

/// Currency sign followed by an amount
static AMOUNT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[¥$]\s*(\d+(?:\.\d+)?)").expect("valid regex"));

static FOOD_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:lunch|dinner|breakfast|brunch|meal|food|coffee|tea|restaurant|snacks?|takeout)\b|饭|餐|吃|外卖|咖啡|奶茶",
    )
    .expect("valid regex")
});

static TRANSIT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:taxi|cab|bus|subway|metro|train|uber|didi|fuel|parking|flight)\b|打车|地铁|公交|火车|高铁|加油",
    )
    .expect("valid regex")
});

/// Classified intent of a chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "intent", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    RecordTransaction { amount: f64, category: String },
    QueryData,
}

fn extract_amount(message: &str) -> Option<f64> {
    AMOUNT_SUFFIX
        .captures(message)
        .or_else(|| AMOUNT_PREFIX.captures(message))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|amount| amount.is_finite() && *amount > 0.0)
}

fn guess_category(message: &str) -> &'static str {
    if FOOD_WORDS.is_match(message) {
        "dining"
    } else if TRANSIT_WORDS.is_match(message) {
        "transport"
    } else {
        "other"
    }
}

/// Classify a message
pub fn classify(message: &str) -> Intent {
    match extract_amount(message) {
        Some(amount) => Intent::RecordTransaction {
            amount,
            category: guess_category(message).to_string(),
        },
        None => Intent::QueryData,
    }
}

/// Canned month-to-date sentence from per-category spending
///
/// `spending` is expected largest first; the top three are named.
pub fn month_to_date_summary(spending: &[CategoryAmount]) -> String {
    let total: f64 = spending.iter().map(|c| c.amount).sum();
    if spending.is_empty() || total <= 0.0 {
        return "You have no expenses recorded this month.".to_string();
    }

    let top = spending
        .iter()
        .take(3)
        .map(|c| format!("{} {:.2}", c.name, c.amount))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "This month you have spent {:.2} in total. Top categories: {}.",
        total, top
    )
}

/// Reply from the heuristic path
#[derive(Debug, Clone, Serialize)]
pub struct QuickReply {
    #[serde(flatten)]
    pub intent: Intent,
    pub reply: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Answers chat messages with the heuristic parser and the ledger
#[derive(Clone)]
pub struct HeuristicAssistant {
    db: Database,
}

impl HeuristicAssistant {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record the expense or summarize the month
    ///
    /// Recording goes through the ledger, so budgets are reconciled.
    pub fn handle(&self, username: &str, message: &str) -> Result<QuickReply> {
        let intent = classify(message);
        match intent {
            Intent::RecordTransaction {
                amount,
                ref category,
            } => {
                let new = NewTransaction::expense(amount, category).with_description(message.trim());
                let write = self.db.create_transaction(username, &new)?;
                info!(
                    username = %username,
                    id = write.value.id,
                    amount,
                    category = %category,
                    "Recorded expense from quick entry"
                );
                let reply = format!(
                    "Recorded expense: amount {:.2}, category {}, date today.",
                    amount, category
                );
                let warnings = write.warnings();
                Ok(QuickReply {
                    intent,
                    reply,
                    warnings,
                })
            }
            Intent::QueryData => {
                let (start, end) = Period::Month.window(crate::db::now().date());
                let spending = self.db.category_spending(username, start, end)?;
                Ok(QuickReply {
                    intent,
                    reply: month_to_date_summary(&spending),
                    warnings: Vec::new(),
                })
            }
        }
    }
}
