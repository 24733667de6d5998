//! Chat service: persists the conversation around each synthesized reply

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::ai::{Providers, ResponseSynthesizer};
use crate::db::Database;
use crate::error::Result;
use crate::models::ChatDirection;
use crate::prompts::PromptLibrary;

/// The reply to one chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatExchange {
    pub reply: String,
    /// True when no provider could phrase the reply
    pub degraded: bool,
    /// Provider that phrased the reply
    pub provider: Option<String>,
    /// `{selected: false}` or `{selected: true, tool, thought, result}`
    pub agent: Value,
    /// Chat persistence failures; the reply is returned regardless
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Handles chat messages end to end
#[derive(Clone)]
pub struct ChatService {
    db: Database,
    providers: Providers,
    synthesizer: ResponseSynthesizer,
}

impl ChatService {
    pub fn new(db: Database, providers: Providers, prompts: PromptLibrary) -> Self {
        let synthesizer = ResponseSynthesizer::new(db.clone(), prompts);
        Self {
            db,
            providers,
            synthesizer,
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Answer `message`, recording the user message and the reply
    ///
    /// Fails only when `provider_override` names an unknown provider.
    pub async fn handle(
        &self,
        username: &str,
        message: &str,
        provider_override: Option<&str>,
    ) -> Result<ChatExchange> {
        let chain = self.providers.chain(provider_override)?;
        let mut warnings = Vec::new();

        if let Err(e) = self.db.add_chat(username, message, ChatDirection::User) {
            warn!(username = %username, error = %e, "Failed to save user message");
            warnings.push(format!("failed to save user message: {}", e));
        }

        let synthesis = self.synthesizer.synthesize(username, message, &chain).await;

        if let Err(e) = self
            .db
            .add_chat(username, &synthesis.reply, ChatDirection::Agent)
        {
            warn!(username = %username, error = %e, "Failed to save assistant reply");
            warnings.push(format!("failed to save assistant reply: {}", e));
        }

        Ok(ChatExchange {
            reply: synthesis.reply,
            degraded: synthesis.degraded,
            provider: synthesis.provider,
            agent: synthesis.agent.to_json(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockProvider, Provider, APOLOGY};

    const USER: &str = "alice";

    fn service(primary: &MockProvider, fallback: &MockProvider) -> (Database, ChatService) {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        let providers = Providers::from_chain(
            Provider::new("primary", primary.clone()),
            Some(Provider::new("backup", fallback.clone())),
        );
        let service = ChatService::new(db.clone(), providers, PromptLibrary::embedded().unwrap());
        (db, service)
    }

    #[tokio::test]
    async fn test_exchange_is_persisted_in_order() {
        let primary = MockProvider::new()
            .reply(r#"{"status": "false"}"#)
            .reply("Hello! How can I help with your spending?");
        let (db, service) = service(&primary, &MockProvider::new());

        let exchange = service.handle(USER, "hi", None).await.unwrap();
        assert_eq!(exchange.reply, "Hello! How can I help with your spending?");
        assert!(exchange.warnings.is_empty());
        assert_eq!(exchange.agent, serde_json::json!({"selected": false}));

        // Newest first
        let history = db.chat_history(USER, 5).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, ChatDirection::Agent);
        assert_eq!(history[0].content, exchange.reply);
        assert_eq!(history[1].direction, ChatDirection::User);
        assert_eq!(history[1].content, "hi");
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_block_reply() {
        let primary = MockProvider::new();
        let (db, service) = service(&primary, &MockProvider::new());
        db.conn()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER fail_chat_insert BEFORE INSERT ON chats
                BEGIN
                    SELECT RAISE(ABORT, 'chat store unavailable');
                END;
                "#,
            )
            .unwrap();

        let exchange = service.handle(USER, "hi", None).await.unwrap();
        assert_eq!(exchange.reply, APOLOGY);
        assert!(exchange.degraded);
        assert_eq!(exchange.warnings.len(), 2);
        assert!(exchange.warnings[0].starts_with("failed to save user message: "));
        assert!(exchange.warnings[1].starts_with("failed to save assistant reply: "));
    }

    #[tokio::test]
    async fn test_provider_override() {
        let primary = MockProvider::new();
        let fallback = MockProvider::new()
            .reply(r#"{"status": "false"}"#)
            .reply("From the backup.");
        let (_db, service) = service(&primary, &fallback);

        let exchange = service.handle(USER, "hi", Some("backup")).await.unwrap();
        assert_eq!(exchange.reply, "From the backup.");
        assert_eq!(exchange.provider.as_deref(), Some("backup"));
        assert_eq!(primary.call_count(), 0);

        assert!(service.handle(USER, "hi", Some("nope")).await.is_err());
    }
}
