//! Response synthesizer
//!
//! Runs the tool-selection agent, then asks a provider to phrase the reply:
//! with the tool result when a tool ran, or as a direct answer otherwise.
//! Both stages apply the same single-fallback policy. When the phrasing
//! stage fails on every provider, the fixed apology is returned instead, so
//! a synthesis always yields displayable text.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::Database;
use crate::prompts::{PromptId, PromptLibrary};

use super::agent::{AgentOutcome, ToolSelectionAgent};
use super::providers::ProviderChain;
use super::types::{ChatMessage, CompletionOptions};
use super::CompletionBackend;

/// Reply used when no provider could phrase an answer
pub const APOLOGY: &str = "Sorry, I can't process your request right now. Please try again later.";

/// Final reply for one chat message
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Never empty
    pub reply: String,
    pub agent: AgentOutcome,
    /// Provider that phrased the reply (`None` when the apology was used)
    pub provider: Option<String>,
    /// True when the apology was used
    pub degraded: bool,
}

/// Outward form of a synthesis, for APIs
#[derive(Debug, Serialize)]
pub struct SynthesisView {
    pub reply: String,
    pub degraded: bool,
    pub provider: Option<String>,
    pub agent: Value,
}

impl From<&Synthesis> for SynthesisView {
    fn from(s: &Synthesis) -> Self {
        Self {
            reply: s.reply.clone(),
            degraded: s.degraded,
            provider: s.provider.clone(),
            agent: s.agent.to_json(),
        }
    }
}

/// Two-stage reply pipeline: agent, then phrasing
#[derive(Clone)]
pub struct ResponseSynthesizer {
    agent: ToolSelectionAgent,
    prompts: PromptLibrary,
    options: CompletionOptions,
}

impl ResponseSynthesizer {
    pub fn new(db: Database, prompts: PromptLibrary) -> Self {
        Self {
            agent: ToolSelectionAgent::new(db, prompts.clone()),
            prompts,
            options: CompletionOptions::default(),
        }
    }

    pub fn agent(&self) -> &ToolSelectionAgent {
        &self.agent
    }

    /// Answer `message` for `username`; never fails
    pub async fn synthesize(&self, username: &str, message: &str, chain: &ProviderChain) -> Synthesis {
        let agent = self.agent.run(username, message, chain).await;
        let messages = self.phrasing_messages(message, &agent);

        for (attempt, provider) in chain.iter().enumerate() {
            if attempt > 0 {
                warn!(provider = %provider.name, "Retrying reply with fallback provider");
            }
            match provider.client.complete(&messages, &self.options).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(provider = %provider.name, "Reply synthesized");
                    return Synthesis {
                        reply: text.trim().to_string(),
                        agent,
                        provider: Some(provider.name.clone()),
                        degraded: false,
                    };
                }
                Ok(_) => {
                    warn!(provider = %provider.name, "Provider returned an empty reply");
                }
                Err(e) => {
                    warn!(provider = %provider.name, error = %e, "Reply completion failed");
                }
            }
        }

        warn!(providers = ?chain.names(), "All providers failed, replying with apology");
        Synthesis {
            reply: APOLOGY.to_string(),
            agent,
            provider: None,
            degraded: true,
        }
    }

    fn phrasing_messages(&self, message: &str, agent: &AgentOutcome) -> Vec<ChatMessage> {
        match agent {
            AgentOutcome::Invoked { tool, result, .. } => {
                let prompt = self.prompts.get(PromptId::NarrateResult);
                let mut vars = HashMap::new();
                vars.insert("message", message.to_string());
                vars.insert("tool", tool.as_str().to_string());
                vars.insert("result", result.to_string());

                let user = prompt
                    .render_user(&vars)
                    .unwrap_or_else(|| message.to_string());
                vec![
                    ChatMessage::system(prompt.render_system(&vars)),
                    ChatMessage::user(user),
                ]
            }
            AgentOutcome::NoSelection { .. } => {
                let prompt = self.prompts.get(PromptId::DirectReply);
                vec![
                    ChatMessage::system(prompt.render_system(&HashMap::new())),
                    ChatMessage::user(message),
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::agent::NoSelectionReason;
    use crate::ai::providers::Provider;
    use crate::ai::MockProvider;

    const USER: &str = "alice";

    fn setup() -> (Database, ResponseSynthesizer) {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        let synthesizer = ResponseSynthesizer::new(db.clone(), PromptLibrary::embedded().unwrap());
        (db, synthesizer)
    }

    fn chain(primary: &MockProvider, fallback: &MockProvider) -> ProviderChain {
        ProviderChain::new(
            Provider::new("primary", primary.clone()),
            Some(Provider::new("backup", fallback.clone())),
        )
    }

    #[tokio::test]
    async fn test_narrates_tool_result() {
        let (db, synthesizer) = setup();
        let primary = MockProvider::new()
            .reply(r#"{"thought": "t", "status": "true", "tool_names": "create_transaction", "args_list": {"create_transaction": {"data": {"amount": 25, "type": "expense", "category": "dining"}}}}"#)
            .reply("Done, I recorded this expense: amount 25.00, category dining, date today.");
        let fallback = MockProvider::new();

        let synthesis = synthesizer
            .synthesize(USER, "coffee and cake 25", &chain(&primary, &fallback))
            .await;
        assert_eq!(
            synthesis.reply,
            "Done, I recorded this expense: amount 25.00, category dining, date today."
        );
        assert!(!synthesis.degraded);
        assert_eq!(synthesis.provider.as_deref(), Some("primary"));
        assert!(synthesis.agent.is_selected());
        assert_eq!(db.count_transactions(USER).unwrap(), 1);

        // The second call carries the message and the structured result
        let calls = primary.calls();
        assert_eq!(calls.len(), 2);
        let user = &calls[1][1].content;
        assert!(user.contains("coffee and cake 25"));
        assert!(user.contains("create_transaction"));
        assert!(user.contains("\"success\":true"));
    }

    #[tokio::test]
    async fn test_direct_reply_when_no_tool() {
        let (_db, synthesizer) = setup();
        let primary = MockProvider::new()
            .reply(r#"{"thought": "greeting", "status": "false"}"#)
            .reply("Hi! Tell me what you spent and I'll record it.");
        let fallback = MockProvider::new();

        let synthesis = synthesizer
            .synthesize(USER, "hello", &chain(&primary, &fallback))
            .await;
        assert_eq!(synthesis.reply, "Hi! Tell me what you spent and I'll record it.");
        assert_eq!(
            synthesis.agent,
            AgentOutcome::NoSelection {
                reason: NoSelectionReason::Declined
            }
        );
        let calls = primary.calls();
        assert_eq!(calls[1][1], ChatMessage::user("hello"));
        assert!(calls[1][0].content.contains("financial assistant"));
    }

    #[tokio::test]
    async fn test_second_stage_falls_back() {
        let (_db, synthesizer) = setup();
        let primary = MockProvider::new()
            .reply(r#"{"status": "false"}"#)
            .fail("timeout");
        let fallback = MockProvider::new().reply("Backup answer.");

        let synthesis = synthesizer
            .synthesize(USER, "hello", &chain(&primary, &fallback))
            .await;
        assert_eq!(synthesis.reply, "Backup answer.");
        assert_eq!(synthesis.provider.as_deref(), Some("backup"));
        assert!(!synthesis.degraded);
    }

    #[tokio::test]
    async fn test_total_output_when_everything_fails() {
        let (_db, synthesizer) = setup();
        let primary = MockProvider::new();
        let fallback = MockProvider::new();

        let synthesis = synthesizer
            .synthesize(USER, "lunch 30 yuan", &chain(&primary, &fallback))
            .await;
        assert_eq!(synthesis.reply, APOLOGY);
        assert!(!synthesis.reply.is_empty());
        assert!(synthesis.degraded);
        assert!(synthesis.provider.is_none());
        assert!(!synthesis.agent.is_selected());
        // Agent and phrasing each tried both providers once
        assert_eq!(primary.call_count(), 2);
        assert_eq!(fallback.call_count(), 2);
    }

    #[tokio::test]
    async fn test_blank_reply_counts_as_failure() {
        let (_db, synthesizer) = setup();
        let primary = MockProvider::new().reply(r#"{"status": "false"}"#).reply("   \n");
        let fallback = MockProvider::new().reply("Real answer.");

        let synthesis = synthesizer
            .synthesize(USER, "hello", &chain(&primary, &fallback))
            .await;
        assert_eq!(synthesis.reply, "Real answer.");

        let view = SynthesisView::from(&synthesis);
        assert_eq!(view.agent, serde_json::json!({"selected": false}));
    }
}
