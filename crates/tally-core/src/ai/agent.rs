//! Tool-selection agent
//!
//! One agent call moves through three states:
//!
//! 1. **Build prompt**: the tool-selection system prompt is rendered with the
//!    acting username, today's date, the live category list and the registry's
//!    tool descriptions. The user's raw message becomes the user message.
//! 2. **Await completion**: exactly one completion request per provider.
//! 3. **Dispatch**: the decision is parsed, the arguments are validated
//!    against the tool's typed parameters, and the tool is invoked once.
//!
//! A declined decision (`status` false) ends the call without fallback.
//! Provider errors, unparseable decisions, unknown tools and argument
//! mismatches move on to the fallback provider, if the chain has one. The
//! chain holds at most two providers, so a call makes at most two attempts.
//!
//! At most one tool is invoked per agent call. A tool that ran but whose
//! ledger operation failed (unknown category, missing row) still counts as
//! invoked: its envelope is the result and the fallback is not consulted.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary};
use crate::tools::{self, ToolCall, ToolName};

use super::parsing::{parse_decision, AgentDecision};
use super::providers::{Provider, ProviderChain};
use super::types::{ChatMessage, CompletionOptions};
use super::CompletionBackend;

/// Why the agent ended without invoking a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoSelectionReason {
    /// The model answered `status: false`
    Declined,
    /// Every provider in the chain failed
    ProviderFailed,
    /// The last response was not a valid decision
    InvalidResponse,
    /// The last decision named an unknown tool or bad arguments
    DispatchFailed,
    /// The prompt could not be built (category list unavailable)
    ContextUnavailable,
}

impl NoSelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declined => "declined",
            Self::ProviderFailed => "provider_failed",
            Self::InvalidResponse => "invalid_response",
            Self::DispatchFailed => "dispatch_failed",
            Self::ContextUnavailable => "context_unavailable",
        }
    }
}

impl fmt::Display for NoSelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one agent call
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Invoked {
        tool: ToolName,
        thought: String,
        /// The tool's envelope, as JSON
        result: Value,
        /// Name of the provider whose decision was dispatched
        provider: String,
    },
    NoSelection {
        reason: NoSelectionReason,
    },
}

impl AgentOutcome {
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Invoked { .. })
    }

    /// Outward form: `{selected: false}` or `{selected: true, tool, thought, result}`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Invoked {
                tool,
                thought,
                result,
                ..
            } => json!({
                "selected": true,
                "tool": tool.as_str(),
                "thought": thought,
                "result": result,
            }),
            Self::NoSelection { .. } => json!({ "selected": false }),
        }
    }
}

/// Outcome of asking one provider
enum Attempt {
    Done(AgentOutcome),
    Failed(NoSelectionReason),
}

/// Chooses and invokes at most one ledger tool for a chat message
#[derive(Clone)]
pub struct ToolSelectionAgent {
    db: Database,
    prompts: PromptLibrary,
    options: CompletionOptions,
}

impl ToolSelectionAgent {
    pub fn new(db: Database, prompts: PromptLibrary) -> Self {
        Self {
            db,
            prompts,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Render the system and user messages for `message`
    ///
    /// Categories are read from the store on every call.
    pub fn build_prompt(&self, username: &str, message: &str) -> Result<Vec<ChatMessage>> {
        let categories = self
            .db
            .list_categories()?
            .iter()
            .map(|c| format!("- {}: {}", c.id, c.name))
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert("username", username.to_string());
        vars.insert(
            "today",
            crate::db::now().date().format("%Y-%m-%d").to_string(),
        );
        vars.insert("categories", categories);
        vars.insert("tools", tools::describe_tools());

        let system = self
            .prompts
            .get(PromptId::ToolSelection)
            .render_system(&vars);
        Ok(vec![ChatMessage::system(system), ChatMessage::user(message)])
    }

    /// Run the agent against the chain, trying the fallback at most once
    pub async fn run(&self, username: &str, message: &str, chain: &ProviderChain) -> AgentOutcome {
        let messages = match self.build_prompt(username, message) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Could not build tool-selection prompt");
                return AgentOutcome::NoSelection {
                    reason: NoSelectionReason::ContextUnavailable,
                };
            }
        };

        let mut last_failure = NoSelectionReason::ProviderFailed;
        for (attempt, provider) in chain.iter().enumerate() {
            if attempt > 0 {
                warn!(
                    provider = %provider.name,
                    previous = %last_failure,
                    "Retrying tool selection with fallback provider"
                );
            }
            match self.attempt(provider, &messages, username).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Failed(reason) => last_failure = reason,
            }
        }

        warn!(reason = %last_failure, "No tool selected after all providers");
        AgentOutcome::NoSelection {
            reason: last_failure,
        }
    }

    async fn attempt(
        &self,
        provider: &Provider,
        messages: &[ChatMessage],
        username: &str,
    ) -> Attempt {
        debug!(provider = %provider.name, state = "await_completion", "Requesting tool selection");
        let response = match provider.client.complete(messages, &self.options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = %provider.name, error = %e, "Tool-selection completion failed");
                return Attempt::Failed(NoSelectionReason::ProviderFailed);
            }
        };

        let decision = match parse_decision(&response) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(provider = %provider.name, error = %e, "Unparseable tool-selection response");
                return Attempt::Failed(NoSelectionReason::InvalidResponse);
            }
        };

        let (thought, tool, arguments) = match decision {
            AgentDecision::Decline { thought } => {
                info!(provider = %provider.name, thought = %thought, "Model selected no tool");
                return Attempt::Done(AgentOutcome::NoSelection {
                    reason: NoSelectionReason::Declined,
                });
            }
            AgentDecision::Select {
                thought,
                tool,
                arguments,
            } => (thought, tool, arguments),
        };

        debug!(provider = %provider.name, state = "dispatch", tool = %tool, "Dispatching selection");
        match invoke(&self.db, username, &tool, arguments) {
            Ok((tool, result)) => {
                info!(provider = %provider.name, tool = %tool, "Tool invoked");
                Attempt::Done(AgentOutcome::Invoked {
                    tool,
                    thought,
                    result,
                    provider: provider.name.clone(),
                })
            }
            Err(e) => {
                warn!(provider = %provider.name, tool = %tool, error = %e, "Tool dispatch failed");
                Attempt::Failed(NoSelectionReason::DispatchFailed)
            }
        }
    }
}

fn invoke(db: &Database, username: &str, tool: &str, arguments: Value) -> Result<(ToolName, Value)> {
    let call = ToolCall::parse(tool, arguments)?;
    let name = call.name();
    let result = tools::dispatch(db, username, call).map_err(|e| match e {
        e @ Error::Dispatch(_) => e,
        other => Error::Dispatch(other.to_string()),
    })?;
    Ok((name, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockProvider;
    use crate::ai::types::Role;

    const USER: &str = "alice";

    const RECORD_LUNCH: &str = r#"{"thought": "lunch is dining", "status": "true", "tool_names": "create_transaction", "args_list": {"create_transaction": {"data": {"amount": 30, "type": "expense", "category": "dining", "description": "lunch"}}}}"#;

    fn setup() -> (Database, ToolSelectionAgent) {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        let agent = ToolSelectionAgent::new(db.clone(), PromptLibrary::embedded().unwrap());
        (db, agent)
    }

    fn chain(primary: &MockProvider, fallback: &MockProvider) -> ProviderChain {
        ProviderChain::new(
            Provider::new("primary", primary.clone()),
            Some(Provider::new("backup", fallback.clone())),
        )
    }

    #[tokio::test]
    async fn test_prompt_carries_live_context() {
        let (db, agent) = setup();
        db.add_category("pets").unwrap();

        let messages = agent.build_prompt(USER, "lunch 30 yuan").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("The current user is: alice"));
        assert!(messages[0].content.contains("- 1: dining"));
        assert!(messages[0].content.contains(": pets"));
        assert!(messages[0].content.contains("- create_transaction("));
        assert!(!messages[0].content.contains("{{"));
        assert_eq!(messages[1], ChatMessage::user("lunch 30 yuan"));
    }

    #[tokio::test]
    async fn test_selection_invokes_tool_once() {
        let (db, agent) = setup();
        let primary = MockProvider::new().reply(RECORD_LUNCH);
        let fallback = MockProvider::new();

        let outcome = agent.run(USER, "lunch 30 yuan", &chain(&primary, &fallback)).await;
        match &outcome {
            AgentOutcome::Invoked {
                tool,
                thought,
                result,
                provider,
            } => {
                assert_eq!(*tool, ToolName::CreateTransaction);
                assert_eq!(thought, "lunch is dining");
                assert_eq!(provider, "primary");
                assert_eq!(result["success"], true);
                assert_eq!(result["data"]["amount"], -30.0);
            }
            other => panic!("expected invocation, got {:?}", other),
        }
        assert_eq!(db.count_transactions(USER).unwrap(), 1);
        assert_eq!(fallback.call_count(), 0);

        let json = outcome.to_json();
        assert_eq!(json["selected"], true);
        assert_eq!(json["tool"], "create_transaction");
    }

    #[tokio::test]
    async fn test_declined_never_dispatches_or_falls_back() {
        let (db, agent) = setup();
        let primary = MockProvider::new()
            .reply(r#"{"thought": "no amount given", "status": "false", "tool_names": "", "args_list": {}}"#);
        let fallback = MockProvider::new().reply(RECORD_LUNCH);

        let outcome = agent.run(USER, "I bought something", &chain(&primary, &fallback)).await;
        assert_eq!(
            outcome,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::Declined
            }
        );
        assert_eq!(outcome.to_json(), json!({"selected": false}));
        assert_eq!(fallback.call_count(), 0);
        assert_eq!(db.count_transactions(USER).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_uses_fallback() {
        let (db, agent) = setup();
        let primary = MockProvider::new().fail("quota exceeded");
        let fallback = MockProvider::new().reply(RECORD_LUNCH);

        let outcome = agent.run(USER, "lunch 30 yuan", &chain(&primary, &fallback)).await;
        assert!(matches!(outcome, AgentOutcome::Invoked { ref provider, .. } if provider == "backup"));
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
        assert_eq!(db.count_transactions(USER).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_invalid_is_uniform_failure() {
        let (_db, agent) = setup();
        let primary = MockProvider::new().reply("I think you spent 30 on lunch");
        let fallback = MockProvider::new().reply("{not json");

        let outcome = agent.run(USER, "lunch 30 yuan", &chain(&primary, &fallback)).await;
        assert_eq!(
            outcome,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::InvalidResponse
            }
        );
        assert_eq!(outcome.to_json(), json!({"selected": false}));
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let (db, agent) = setup();
        let primary = MockProvider::new()
            .reply(r#"{"status": "true", "tool_names": "transfer_money", "args_list": {}}"#);
        let fallback = MockProvider::new().reply(
            r#"{"status": "true", "tool_names": "create_transaction", "args_list": {"create_transaction": {"amount": 30}}}"#,
        );

        let outcome = agent.run(USER, "lunch 30 yuan", &chain(&primary, &fallback)).await;
        assert_eq!(
            outcome,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::DispatchFailed
            }
        );
        assert_eq!(db.count_transactions(USER).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_username_mismatch_is_dispatch_failure() {
        let (db, agent) = setup();
        let primary = MockProvider::new().reply(
            r#"{"status": "true", "tool_names": "get_summary", "args_list": {"get_summary": {"username": "mallory"}}}"#,
        );
        let single = ProviderChain::new(Provider::new("primary", primary), None);

        let outcome = agent.run(USER, "how much did I spend", &single).await;
        assert_eq!(
            outcome,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::DispatchFailed
            }
        );
        assert_eq!(db.count_transactions(USER).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_still_invoked() {
        let (_db, agent) = setup();
        let primary = MockProvider::new().reply(
            r#"{"status": "true", "tool_names": "create_budget", "args_list": {"create_budget": {"data": {"name": "trips", "target_amount": 500, "category": "travel"}}}}"#,
        );
        let fallback = MockProvider::new();

        let outcome = agent.run(USER, "budget 500 for travel", &chain(&primary, &fallback)).await;
        match outcome {
            AgentOutcome::Invoked { tool, result, .. } => {
                assert_eq!(tool, ToolName::CreateBudget);
                assert_eq!(result["success"], false);
                assert_eq!(result["error"], "Invalid data: Unknown category: travel");
            }
            other => panic!("expected invocation, got {:?}", other),
        }
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_single_provider_chain_fails_once() {
        let (_db, agent) = setup();
        let only = MockProvider::new().fail("connection refused");
        let single = ProviderChain::new(Provider::new("only", only.clone()), None);

        let outcome = agent.run(USER, "hello", &single).await;
        assert_eq!(
            outcome,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::ProviderFailed
            }
        );
        assert_eq!(only.call_count(), 1);
    }
}
