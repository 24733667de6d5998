//! Pluggable completion provider abstraction and the conversational layer
//!
//! # Architecture
//!
//! - `CompletionBackend` trait: one text completion for a list of role-tagged
//!   messages, plus health and identity
//! - `ProviderClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockProvider`
//! - `Providers` / `ProviderChain`: the configured providers and the ordered
//!   primary-then-fallback list tried for one call
//! - `ToolSelectionAgent`: chooses and invokes at most one ledger tool
//! - `ResponseSynthesizer`: phrases the final reply and never fails
//!
//! # Usage
//!
//! ```rust,ignore
//! let settings = ProviderSettings::load()?;
//! let providers = Providers::from_settings(&settings)?;
//! let synthesizer = ResponseSynthesizer::new(db, PromptLibrary::load()?);
//! let synthesis = synthesizer
//!     .synthesize("alice", "lunch 30 yuan", &providers.chain(None)?)
//!     .await;
//! println!("{}", synthesis.reply);
//! ```

pub mod agent;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
mod providers;
pub mod synthesizer;
pub mod types;

pub use agent::{AgentOutcome, NoSelectionReason, ToolSelectionAgent};
pub use mock::{MockProvider, MockReply};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use providers::{Provider, ProviderChain, ProviderInfo, Providers};
pub use synthesizer::{ResponseSynthesizer, Synthesis, SynthesisView, APOLOGY};
pub use types::*;

use async_trait::async_trait;

use crate::config::{BackendKind, ProviderConfig};
use crate::error::Result;

/// Trait implemented by every completion backend
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Return a single completion for the messages
    ///
    /// Network, auth and quota failures, non-2xx responses and responses
    /// without a completion are all `Error::Provider`.
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions)
        -> Result<String>;

    /// Check whether the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name sent with each request
    fn model(&self) -> &str;

    /// Base URL of the backend
    fn host(&self) -> &str;
}

/// Concrete completion client wrapping all backend implementations
///
/// This enum provides:
/// - Clone support (trait objects can't be cloned)
/// - Compile-time dispatch (no vtable overhead)
/// - Easy backend selection from configuration
#[derive(Clone)]
pub enum ProviderClient {
    OpenAICompatible(OpenAICompatibleBackend),
    Ollama(OllamaBackend),
    Mock(MockProvider),
}

impl ProviderClient {
    /// Build the client for a configured provider
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(match config.backend {
            BackendKind::OpenaiCompatible => {
                Self::OpenAICompatible(OpenAICompatibleBackend::from_config(config)?)
            }
            BackendKind::Ollama => Self::Ollama(OllamaBackend::from_config(config)?),
            BackendKind::Mock => Self::Mock(
                MockProvider::always(
                    "I'm running in offline mode and can't look at your ledger right now.",
                )
                .with_model(&config.model),
            ),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::OpenAICompatible(_) => "openai_compatible",
            Self::Ollama(_) => "ollama",
            Self::Mock(_) => "mock",
        }
    }
}

impl From<OpenAICompatibleBackend> for ProviderClient {
    fn from(backend: OpenAICompatibleBackend) -> Self {
        Self::OpenAICompatible(backend)
    }
}

impl From<MockProvider> for ProviderClient {
    fn from(mock: MockProvider) -> Self {
        Self::Mock(mock)
    }
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        match self {
            Self::OpenAICompatible(b) => b.complete(messages, options).await,
            Self::Ollama(b) => b.complete(messages, options).await,
            Self::Mock(b) => b.complete(messages, options).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Self::OpenAICompatible(b) => b.health_check().await,
            Self::Ollama(b) => b.health_check().await,
            Self::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAICompatible(b) => b.model(),
            Self::Ollama(b) => b.model(),
            Self::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            Self::OpenAICompatible(b) => b.host(),
            Self::Ollama(b) => b.host(),
            Self::Mock(b) => b.host(),
        }
    }
}
