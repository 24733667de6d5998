//! Tally Core Library
//!
//! Shared functionality for the Tally conversational expense tracker:
//! - Database access and migrations (transactions, budgets, categories, chats, audit log)
//! - Budget reconciliation engine with atomic or best-effort commit policy
//! - Function registry mapping tool names to typed ledger operations
//! - Pluggable completion providers (OpenAI-compatible, Ollama, mock) with a
//!   single-fallback provider chain
//! - Tool-selection agent and response synthesizer
//! - Heuristic intent parser for model-free quick entry
//! - Prompt library and provider configuration

pub mod ai;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod intent;
pub mod models;
pub mod prompts;
pub mod reconcile;
pub mod tools;

/// Test utilities including a mock OpenAI-compatible completion server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AgentOutcome, ChatMessage, CompletionBackend, CompletionOptions, MockProvider,
    NoSelectionReason, OllamaBackend, OpenAICompatibleBackend, Provider, ProviderChain,
    ProviderClient, Providers, ResponseSynthesizer, Synthesis, ToolSelectionAgent, APOLOGY,
};
pub use chat::{ChatExchange, ChatService};
pub use config::{BackendKind, Profile, ProviderConfig, ProviderSettings};
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use intent::{classify, HeuristicAssistant, Intent, QuickReply};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use reconcile::{BudgetSync, LedgerWrite, ReconcilePolicy};
pub use tools::{ToolCall, ToolName, ToolSpec};
