//! Domain models for Tally

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether a transaction spends or earns money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }

    /// Apply the storage sign convention: expenses negative, income positive
    pub fn normalize(&self, amount: f64) -> f64 {
        match self {
            Self::Expense => -amount.abs(),
            Self::Income => amount.abs(),
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub username: String,
    /// Signed amount: negative for expenses, positive for income
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// How much this transaction counts against a budget in its category
    pub fn expense_effect(&self) -> f64 {
        match self.kind {
            TransactionKind::Expense => -self.amount,
            TransactionKind::Income => 0.0,
        }
    }
}

/// Fields for creating a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to now
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
}

impl NewTransaction {
    pub fn expense(amount: f64, category: &str) -> Self {
        Self {
            amount,
            kind: TransactionKind::Expense,
            category: category.to_string(),
            description: None,
            date: None,
        }
    }

    pub fn income(amount: f64, category: &str) -> Self {
        Self {
            kind: TransactionKind::Income,
            ..Self::expense(amount, category)
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn on(mut self, date: NaiveDateTime) -> Self {
        self.date = Some(date);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_amount(self.amount)?;
        if self.category.trim().is_empty() {
            return Err(Error::InvalidData("category is required".into()));
        }
        Ok(())
    }
}

/// Partial update for a transaction; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionUpdate {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.kind.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.date.is_none()
    }

    /// Merge this update over an existing transaction
    pub fn apply_to(&self, existing: &Transaction) -> Result<Transaction> {
        let kind = self.kind.unwrap_or(existing.kind);
        let amount = match self.amount {
            Some(amount) => {
                validate_amount(amount)?;
                amount
            }
            None => existing.amount,
        };
        let category = match &self.category {
            Some(c) if c.trim().is_empty() => {
                return Err(Error::InvalidData("category cannot be empty".into()))
            }
            Some(c) => c.trim().to_string(),
            None => existing.category.clone(),
        };

        Ok(Transaction {
            id: existing.id,
            username: existing.username.clone(),
            amount: kind.normalize(amount),
            kind,
            category,
            description: self
                .description
                .clone()
                .unwrap_or_else(|| existing.description.clone()),
            date: self.date.unwrap_or(existing.date),
            created_at: existing.created_at,
        })
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount == 0.0 {
        return Err(Error::InvalidData(format!(
            "amount must be a non-zero number, got {}",
            amount
        )));
    }
    Ok(())
}

/// Calendar period used for budget windows and spending reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Month,
    Quarter,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// Inclusive `[start, end]` window of the period containing `day`
    pub fn window(&self, day: NaiveDate) -> (NaiveDate, NaiveDate) {
        let (start_month, months) = match self {
            Self::Month => (day.month(), 1),
            Self::Quarter => ((day.month0() / 3) * 3 + 1, 3),
            Self::Year => (1, 12),
        };
        let start = NaiveDate::from_ymd_opt(day.year(), start_month, 1).unwrap_or(day);
        let end = start
            .checked_add_months(chrono::Months::new(months))
            .and_then(|next| next.pred_opt())
            .unwrap_or(day);
        (start, end)
    }

    /// Human phrase used in report titles ("this month")
    pub fn label(&self) -> &'static str {
        match self {
            Self::Month => "this month",
            Self::Quarter => "this quarter",
            Self::Year => "this year",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" | "monthly" => Ok(Self::Month),
            "quarter" | "quarterly" => Ok(Self::Quarter),
            "year" | "yearly" | "annual" => Ok(Self::Year),
            _ => Err(format!("Invalid range type: {}", s)),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A spending plan for one category over a date window
///
/// `current_amount` is a cached aggregate kept in step with the matching
/// expenses by the reconciliation engine, never below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub category: String,
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Budget {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn remaining(&self) -> f64 {
        self.target_amount - self.current_amount
    }
}

/// Fields for creating a budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBudget {
    pub name: String,
    pub target_amount: f64,
    pub category: String,
    /// Window type, defaults to the current month
    #[serde(default, rename = "type")]
    pub period: Option<Period>,
}

/// Editable budget fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Who authored a chat record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatDirection {
    User,
    Agent,
}

impl ChatDirection {
    /// Stored flag: 1 for user-authored, 0 for agent-authored
    pub fn as_flag(&self) -> i64 {
        match self {
            Self::User => 1,
            Self::Agent => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag == 1 {
            Self::User
        } else {
            Self::Agent
        }
    }
}

/// Append-only conversation log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub username: String,
    pub content: String,
    pub direction: ChatDirection,
    pub date: NaiveDateTime,
}

/// Income/expense totals for the current calendar month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub income: f64,
    /// Negative, following the storage sign convention
    pub expense: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAmount {
    pub name: String,
    pub amount: f64,
}

/// Expense breakdown by category for a report range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingReport {
    pub title: String,
    pub range: Period,
    pub total: f64,
    pub categories: Vec<CategoryAmount>,
}

/// Uniform result shape for everything handed outward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

impl<T> From<Result<T>> for Envelope<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Round to cents for presentation
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
