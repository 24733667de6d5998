//! Function registry for the tool-selection agent
//!
//! Every ledger operation the model may invoke is a [`ToolName`] variant with
//! a typed parameter struct. The registry table is built once on first use and
//! never changes afterwards. A model decision becomes a [`ToolCall`] through
//! [`ToolCall::parse`], which rejects unknown tools and mismatched arguments
//! before anything touches the database; [`dispatch`] then runs the call and
//! returns the ledger's envelope as JSON.
//!
//! Ledger failures (unknown category, invalid range, missing row) are part of
//! the envelope (`success: false`), not dispatch errors.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::db::{Database, DEFAULT_TRANSACTION_LIMIT};
use crate::error::{Error, Result};
use crate::models::{
    Envelope, NewBudget, NewTransaction, Period, TransactionKind, TransactionUpdate,
};
use crate::reconcile::LedgerWrite;

// =============================================================================
// Tool names
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetCurrentDatetime,
    Add,
    GetSummary,
    GetTransactions,
    CreateTransaction,
    UpdateTransaction,
    DeleteTransaction,
    GetBudgets,
    CreateBudget,
    GetCategories,
    AddCategory,
    UpdateCategory,
    DeleteCategory,
    GetReports,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        Self::GetCurrentDatetime,
        Self::Add,
        Self::GetSummary,
        Self::GetTransactions,
        Self::CreateTransaction,
        Self::UpdateTransaction,
        Self::DeleteTransaction,
        Self::GetBudgets,
        Self::CreateBudget,
        Self::GetCategories,
        Self::AddCategory,
        Self::UpdateCategory,
        Self::DeleteCategory,
        Self::GetReports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetCurrentDatetime => "get_current_datetime",
            Self::Add => "add",
            Self::GetSummary => "get_summary",
            Self::GetTransactions => "get_transactions",
            Self::CreateTransaction => "create_transaction",
            Self::UpdateTransaction => "update_transaction",
            Self::DeleteTransaction => "delete_transaction",
            Self::GetBudgets => "get_budgets",
            Self::CreateBudget => "create_budget",
            Self::GetCategories => "get_categories",
            Self::AddCategory => "add_category",
            Self::UpdateCategory => "update_category",
            Self::DeleteCategory => "delete_category",
            Self::GetReports => "get_reports",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetCurrentDatetime => "Get the current local date and time.",
            Self::Add => "Add two numbers a and b.",
            Self::GetSummary => {
                "Get this month's income, expense and balance for the user."
            }
            Self::GetTransactions => {
                "List the user's most recent transactions, newest first (default limit 10)."
            }
            Self::CreateTransaction => {
                "Record a transaction. data: amount (positive number), type (expense|income), \
                 category (one of the existing categories), optional description, \
                 optional date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS, defaults to now)."
            }
            Self::UpdateTransaction => {
                "Update a transaction by id. data may contain any of amount, type, category, \
                 description, date; omitted fields keep their values."
            }
            Self::DeleteTransaction => "Delete a transaction by id.",
            Self::GetBudgets => "List the user's budgets with target and current amounts.",
            Self::CreateBudget => {
                "Create a budget. data: name, target_amount (positive number), category \
                 (must exist), optional type (month|quarter|year, defaults to month)."
            }
            Self::GetCategories => "List all categories with their ids.",
            Self::AddCategory => "Add a new category by name.",
            Self::UpdateCategory => "Rename the category with the given id to new_name.",
            Self::DeleteCategory => "Delete the category with the given id.",
            Self::GetReports => {
                "Get spending by category since the start of the current period. \
                 range_type: month|quarter|year (defaults to month)."
            }
        }
    }

    fn schema(&self) -> Value {
        let schema = match self {
            Self::GetCurrentDatetime | Self::GetCategories => schemars::schema_for!(NoParams),
            Self::Add => schemars::schema_for!(AddParams),
            Self::GetSummary | Self::GetBudgets => schemars::schema_for!(UserParams),
            Self::GetTransactions => schemars::schema_for!(GetTransactionsParams),
            Self::CreateTransaction => schemars::schema_for!(CreateTransactionParams),
            Self::UpdateTransaction => schemars::schema_for!(UpdateTransactionParams),
            Self::DeleteTransaction | Self::DeleteCategory => schemars::schema_for!(IdParams),
            Self::CreateBudget => schemars::schema_for!(CreateBudgetParams),
            Self::AddCategory => schemars::schema_for!(AddCategoryParams),
            Self::UpdateCategory => schemars::schema_for!(UpdateCategoryParams),
            Self::GetReports => schemars::schema_for!(GetReportsParams),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }
}

impl std::str::FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s.trim())
            .ok_or_else(|| Error::Dispatch(format!("Unknown tool: {}", s)))
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A registry entry: name, description and declared parameter names
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub params: Vec<String>,
    pub schema: Value,
}

static REGISTRY: LazyLock<Vec<ToolSpec>> = LazyLock::new(|| {
    ToolName::ALL
        .iter()
        .map(|&name| {
            let schema = name.schema();
            ToolSpec {
                name,
                description: name.description(),
                params: param_names(&schema),
                schema,
            }
        })
        .collect()
});

fn param_names(schema: &Value) -> Vec<String> {
    let mut names: Vec<String> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

/// The process-wide tool table
pub fn registry() -> &'static [ToolSpec] {
    &REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    registry().iter().find(|spec| spec.name.as_str() == name.trim())
}

/// Registry rendered for the tool-selection prompt, one tool per line
pub fn describe_tools() -> String {
    registry()
        .iter()
        .map(|spec| {
            format!(
                "- {}({}): {}",
                spec.name,
                spec.params.join(", "),
                spec.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Argument coercion
// =============================================================================

/// Models often quote numbers; accept both forms
mod lenient {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    fn to_f64<E: de::Error>(value: NumberOrString) -> Result<f64, E> {
        match value {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got {:?}", s))),
        }
    }

    fn to_i64<E: de::Error>(value: NumberOrString) -> Result<i64, E> {
        let n = to_f64(value)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(E::custom(format!("expected an integer, got {}", n)));
        }
        Ok(n as i64)
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        to_f64(NumberOrString::deserialize(d)?)
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Option::<NumberOrString>::deserialize(d)?
            .map(to_f64)
            .transpose()
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        to_i64(NumberOrString::deserialize(d)?)
    }

    pub fn opt_integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Option::<NumberOrString>::deserialize(d)?
            .map(to_i64)
            .transpose()
    }

    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
    pub fn opt_datetime<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let s = raw.trim();
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date: {:?}", raw)))
    }
}

// =============================================================================
// Parameter structs
// =============================================================================

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UserParams {
    #[schemars(description = "Acting username (optional, must match the current user)")]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddParams {
    #[serde(deserialize_with = "lenient::number")]
    #[schemars(with = "f64")]
    pub a: f64,
    #[serde(deserialize_with = "lenient::number")]
    #[schemars(with = "f64")]
    pub b: f64,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetTransactionsParams {
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_integer")]
    #[schemars(with = "Option<i64>")]
    #[schemars(description = "Maximum number of transactions (default 10)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TransactionData {
    #[serde(deserialize_with = "lenient::number")]
    #[schemars(with = "f64")]
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_datetime")]
    #[schemars(with = "Option<String>")]
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTransactionParams {
    pub username: Option<String>,
    pub data: TransactionData,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TransactionPatch {
    #[serde(default, deserialize_with = "lenient::opt_number")]
    #[schemars(with = "Option<f64>")]
    pub amount: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_datetime")]
    #[schemars(with = "Option<String>")]
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateTransactionParams {
    pub username: Option<String>,
    #[serde(deserialize_with = "lenient::integer")]
    #[schemars(with = "i64")]
    pub id: i64,
    pub data: TransactionPatch,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IdParams {
    pub username: Option<String>,
    #[serde(deserialize_with = "lenient::integer")]
    #[schemars(with = "i64")]
    pub id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetData {
    pub name: String,
    #[serde(deserialize_with = "lenient::number")]
    #[schemars(with = "f64")]
    pub target_amount: f64,
    pub category: String,
    // Parsed at dispatch so an unknown window is a ledger failure
    #[serde(default, rename = "type")]
    #[schemars(description = "month, quarter or year")]
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateBudgetParams {
    pub username: Option<String>,
    pub data: BudgetData,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddCategoryParams {
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateCategoryParams {
    #[serde(deserialize_with = "lenient::integer")]
    #[schemars(with = "i64")]
    pub id: i64,
    #[serde(alias = "name")]
    pub new_name: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetReportsParams {
    pub username: Option<String>,
    #[schemars(description = "month, quarter or year")]
    pub range_type: Option<String>,
}

// =============================================================================
// Calls
// =============================================================================

/// A validated tool invocation
#[derive(Debug)]
pub enum ToolCall {
    GetCurrentDatetime,
    Add(AddParams),
    GetSummary(UserParams),
    GetTransactions(GetTransactionsParams),
    CreateTransaction(CreateTransactionParams),
    UpdateTransaction(UpdateTransactionParams),
    DeleteTransaction(IdParams),
    GetBudgets(UserParams),
    CreateBudget(CreateBudgetParams),
    GetCategories,
    AddCategory(AddCategoryParams),
    UpdateCategory(UpdateCategoryParams),
    DeleteCategory(IdParams),
    GetReports(GetReportsParams),
}

fn args<T: serde::de::DeserializeOwned>(tool: ToolName, value: Value) -> Result<T> {
    let value = match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| Error::Dispatch(format!("Invalid arguments for {}: {}", tool, e)))
}

impl ToolCall {
    /// Resolve a tool name and check its arguments against the typed parameters
    pub fn parse(name: &str, arguments: Value) -> Result<Self> {
        let tool: ToolName = name.parse()?;
        let call = match tool {
            ToolName::GetCurrentDatetime => {
                args::<NoParams>(tool, arguments)?;
                Self::GetCurrentDatetime
            }
            ToolName::Add => Self::Add(args(tool, arguments)?),
            ToolName::GetSummary => Self::GetSummary(args(tool, arguments)?),
            ToolName::GetTransactions => Self::GetTransactions(args(tool, arguments)?),
            ToolName::CreateTransaction => Self::CreateTransaction(args(tool, arguments)?),
            ToolName::UpdateTransaction => Self::UpdateTransaction(args(tool, arguments)?),
            ToolName::DeleteTransaction => Self::DeleteTransaction(args(tool, arguments)?),
            ToolName::GetBudgets => Self::GetBudgets(args(tool, arguments)?),
            ToolName::CreateBudget => Self::CreateBudget(args(tool, arguments)?),
            ToolName::GetCategories => {
                args::<NoParams>(tool, arguments)?;
                Self::GetCategories
            }
            ToolName::AddCategory => Self::AddCategory(args(tool, arguments)?),
            ToolName::UpdateCategory => Self::UpdateCategory(args(tool, arguments)?),
            ToolName::DeleteCategory => Self::DeleteCategory(args(tool, arguments)?),
            ToolName::GetReports => Self::GetReports(args(tool, arguments)?),
        };
        Ok(call)
    }

    pub fn name(&self) -> ToolName {
        match self {
            Self::GetCurrentDatetime => ToolName::GetCurrentDatetime,
            Self::Add(_) => ToolName::Add,
            Self::GetSummary(_) => ToolName::GetSummary,
            Self::GetTransactions(_) => ToolName::GetTransactions,
            Self::CreateTransaction(_) => ToolName::CreateTransaction,
            Self::UpdateTransaction(_) => ToolName::UpdateTransaction,
            Self::DeleteTransaction(_) => ToolName::DeleteTransaction,
            Self::GetBudgets(_) => ToolName::GetBudgets,
            Self::CreateBudget(_) => ToolName::CreateBudget,
            Self::GetCategories => ToolName::GetCategories,
            Self::AddCategory(_) => ToolName::AddCategory,
            Self::UpdateCategory(_) => ToolName::UpdateCategory,
            Self::DeleteCategory(_) => ToolName::DeleteCategory,
            Self::GetReports(_) => ToolName::GetReports,
        }
    }

    /// Username the model put in the arguments, if any
    fn claimed_username(&self) -> Option<&str> {
        let claimed = match self {
            Self::GetSummary(p) | Self::GetBudgets(p) => &p.username,
            Self::GetTransactions(p) => &p.username,
            Self::CreateTransaction(p) => &p.username,
            Self::UpdateTransaction(p) => &p.username,
            Self::DeleteTransaction(p) | Self::DeleteCategory(p) => &p.username,
            Self::CreateBudget(p) => &p.username,
            Self::GetReports(p) => &p.username,
            _ => return None,
        };
        claimed.as_deref()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

fn envelope<T: Serialize>(result: Result<T>) -> Result<Value> {
    Ok(serde_json::to_value(Envelope::from(result))?)
}

fn ledger_envelope<T: Serialize>(result: Result<LedgerWrite<T>>) -> Result<Value> {
    let env = match result {
        Ok(write) => {
            let warnings = write.warnings();
            Envelope::ok(write.value).with_warnings(warnings)
        }
        Err(e) => Envelope::failure(e.to_string()),
    };
    Ok(serde_json::to_value(env)?)
}

/// Invoke a validated call on behalf of `username`
///
/// Returns `Err` only when the call itself is not acceptable (a username
/// argument naming someone else) or the result cannot be serialized.
pub fn dispatch(db: &Database, username: &str, call: ToolCall) -> Result<Value> {
    if let Some(claimed) = call.claimed_username() {
        if claimed != username {
            return Err(Error::Dispatch(format!(
                "{} called for user {:?} on behalf of {:?}",
                call.name(),
                claimed,
                username
            )));
        }
    }

    debug!(tool = %call.name(), username = %username, "Dispatching tool call");

    match call {
        ToolCall::GetCurrentDatetime => envelope(Ok(serde_json::json!({
            "datetime": crate::db::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }))),
        ToolCall::Add(p) => envelope(Ok(p.a + p.b)),
        ToolCall::GetSummary(_) => envelope(db.monthly_summary(username)),
        ToolCall::GetTransactions(p) => envelope(
            db.list_transactions(username, p.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT)),
        ),
        ToolCall::CreateTransaction(p) => {
            let new = NewTransaction {
                amount: p.data.amount,
                kind: p.data.kind,
                category: p.data.category,
                description: p.data.description,
                date: p.data.date,
            };
            ledger_envelope(db.create_transaction(username, &new))
        }
        ToolCall::UpdateTransaction(p) => {
            let update = TransactionUpdate {
                amount: p.data.amount,
                kind: p.data.kind,
                category: p.data.category,
                description: p.data.description,
                date: p.data.date,
            };
            ledger_envelope(db.update_transaction(username, p.id, &update))
        }
        ToolCall::DeleteTransaction(p) => ledger_envelope(db.delete_transaction(username, p.id)),
        ToolCall::GetBudgets(_) => envelope(db.list_budgets(username)),
        ToolCall::CreateBudget(p) => {
            let result = p
                .data
                .period
                .as_deref()
                .map(|s| s.parse::<Period>().map_err(Error::InvalidData))
                .transpose()
                .and_then(|period| {
                    db.create_budget(
                        username,
                        &NewBudget {
                            name: p.data.name,
                            target_amount: p.data.target_amount,
                            category: p.data.category,
                            period,
                        },
                    )
                });
            envelope(result)
        }
        ToolCall::GetCategories => envelope(db.list_categories()),
        ToolCall::AddCategory(p) => envelope(db.add_category(&p.name)),
        ToolCall::UpdateCategory(p) => envelope(db.update_category(p.id, &p.new_name)),
        ToolCall::DeleteCategory(p) => envelope(db.delete_category(p.id)),
        ToolCall::GetReports(p) => {
            let result = p
                .range_type
                .as_deref()
                .unwrap_or("month")
                .parse::<Period>()
                .map_err(Error::InvalidData)
                .and_then(|range| db.spending_report(username, range));
            envelope(result)
        }
    }
}
