//! Scripted in-process provider
//!
//! Replies are served from a queue of canned completions or failures, and
//! every call's messages are recorded so tests can assert on prompts.
//! Clones share the same script and call log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{ChatMessage, CompletionOptions};
use super::CompletionBackend;

/// Reply served by [`MockProvider`] for one call
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    calls: Vec<Vec<ChatMessage>>,
}

/// Mock completion provider for tests and offline use
#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    healthy: bool,
    /// Served once the script is exhausted; `None` fails instead
    default_reply: Option<String>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Empty script; calls fail once nothing is queued
    pub fn new() -> Self {
        Self {
            model: "mock".to_string(),
            healthy: true,
            default_reply: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Provider that fails every call
    pub fn failing() -> Self {
        Self::new()
    }

    /// Provider that answers every call with the same text
    pub fn always(reply: &str) -> Self {
        Self::new().with_default_reply(reply)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = Some(reply.to_string());
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Queue a successful completion
    pub fn reply(self, text: &str) -> Self {
        self.lock().script.push_back(MockReply::Text(text.to_string()));
        self
    }

    /// Queue a provider failure
    pub fn fail(self, reason: &str) -> Self {
        self.lock().script.push_back(MockReply::Fail(reason.to_string()));
        self
    }

    /// Number of completion calls made so far
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Messages of every call, in order
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.lock().calls.clone()
    }

    /// Replies still queued
    pub fn remaining(&self) -> usize {
        self.lock().script.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CompletionBackend for MockProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(messages.to_vec());
        match state.script.pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(reason)) => Err(Error::Provider(reason)),
            None => self
                .default_reply
                .clone()
                .ok_or_else(|| Error::Provider("mock provider has no scripted reply".into())),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock://local"
    }
}
