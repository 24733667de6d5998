//! Configured providers and per-call provider chains

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::ProviderSettings;
use crate::error::{Error, Result};

use super::types::ProviderStatus;
use super::{CompletionBackend, ProviderClient};

/// A named completion client
#[derive(Clone)]
pub struct Provider {
    pub name: String,
    pub client: ProviderClient,
}

impl Provider {
    pub fn new(name: &str, client: impl Into<ProviderClient>) -> Self {
        Self {
            name: name.to_string(),
            client: client.into(),
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("backend", &self.client.backend_name())
            .field("model", &self.client.model())
            .finish()
    }
}

/// Ordered providers tried for one call: primary, then at most one fallback
#[derive(Debug, Clone)]
pub struct ProviderChain {
    providers: Vec<Provider>,
}

impl ProviderChain {
    pub fn new(primary: Provider, fallback: Option<Provider>) -> Self {
        let mut providers = vec![primary];
        providers.extend(fallback);
        Self { providers }
    }

    pub fn primary(&self) -> &Provider {
        &self.providers[0]
    }

    pub fn fallback(&self) -> Option<&Provider> {
        self.providers.get(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Summary of one configured provider for listings
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub backend: &'static str,
    pub model: String,
    pub host: String,
}

/// All configured providers with the default primary and fallback
#[derive(Clone)]
pub struct Providers {
    primary: String,
    fallback: Option<String>,
    settings: Option<ProviderSettings>,
    clients: BTreeMap<String, Provider>,
}

impl Providers {
    /// Build a client for every provider in the settings
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let clients = settings
            .providers
            .values()
            .map(|config| {
                let client = ProviderClient::from_config(config)?;
                debug!(
                    provider = %config.name,
                    backend = client.backend_name(),
                    model = %config.model,
                    "Configured completion provider"
                );
                Ok((config.name.clone(), Provider::new(&config.name, client)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            primary: settings.primary.clone(),
            fallback: settings.fallback.clone(),
            settings: Some(settings.clone()),
            clients,
        })
    }

    /// Fixed providers, bypassing configuration (tests and embedding)
    pub fn from_chain(primary: Provider, fallback: Option<Provider>) -> Self {
        let mut clients = BTreeMap::new();
        let fallback_name = fallback.as_ref().map(|p| p.name.clone());
        let primary_name = primary.name.clone();
        clients.insert(primary.name.clone(), primary);
        if let Some(fallback) = fallback {
            clients.insert(fallback.name.clone(), fallback);
        }
        Self {
            primary: primary_name,
            fallback: fallback_name,
            settings: None,
            clients,
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.clients.get(name)
    }

    /// The chain for one call, with `requested` replacing the default primary
    pub fn chain(&self, requested: Option<&str>) -> Result<ProviderChain> {
        let order = match self.settings {
            Some(ref settings) => settings.chain_order(requested)?,
            None => self.fixed_order(requested)?,
        };

        let mut providers = order.iter().map(|name| {
            self.clients
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("Unknown provider: {}", name)))
        });
        // chain_order always yields the primary first
        let primary = providers
            .next()
            .ok_or_else(|| Error::Config("No providers configured".into()))??;
        let fallback = providers.next().transpose()?;
        Ok(ProviderChain::new(primary, fallback))
    }

    fn fixed_order(&self, requested: Option<&str>) -> Result<Vec<String>> {
        let primary = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) if !self.clients.contains_key(name) => {
                return Err(Error::Config(format!("Unknown provider: {}", name)))
            }
            Some(name) => name.to_string(),
            None => self.primary.clone(),
        };
        let fallback = if self.fallback.as_deref() == Some(primary.as_str()) {
            Some(self.primary.clone())
        } else {
            self.fallback.clone()
        };
        let mut order = vec![primary.clone()];
        order.extend(fallback.filter(|f| *f != primary));
        Ok(order)
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.clients
            .values()
            .map(|p| ProviderInfo {
                name: p.name.clone(),
                backend: p.client.backend_name(),
                model: p.client.model().to_string(),
                host: p.client.host().to_string(),
            })
            .collect()
    }

    /// Health-check every provider sequentially
    pub async fn check_all(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::with_capacity(self.clients.len());
        for provider in self.clients.values() {
            statuses.push(ProviderStatus {
                name: provider.name.clone(),
                backend: provider.client.backend_name().to_string(),
                model: provider.client.model().to_string(),
                host: provider.client.host().to_string(),
                healthy: provider.client.health_check().await,
            });
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockProvider;

    const CONFIG: &str = r#"
[defaults]
primary = "a"
fallback = "b"

[providers.a]
backend = "mock"
host = "mock://a"
model = "model-a"

[providers.b]
backend = "mock"
host = "mock://b"
model = "model-b"

[providers.c]
backend = "ollama"
host = "http://localhost:11434/"
model = "qwen2.5:7b"
"#;

    #[test]
    fn test_from_settings_builds_every_backend() {
        let settings = ProviderSettings::from_toml(CONFIG).unwrap();
        let providers = Providers::from_settings(&settings).unwrap();

        let list = providers.list();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].backend, "mock");
        assert_eq!(list[0].model, "model-a");
        assert_eq!(list[2].backend, "ollama");
        assert_eq!(list[2].host, "http://localhost:11434");
    }

    #[test]
    fn test_chain_follows_settings() {
        let settings = ProviderSettings::from_toml(CONFIG).unwrap();
        let providers = Providers::from_settings(&settings).unwrap();

        assert_eq!(providers.chain(None).unwrap().names(), vec!["a", "b"]);
        assert_eq!(providers.chain(Some("b")).unwrap().names(), vec!["b", "a"]);
        assert_eq!(providers.chain(Some("c")).unwrap().names(), vec!["c", "b"]);
        assert!(providers.chain(Some("nope")).is_err());
    }

    #[test]
    fn test_fixed_chain() {
        let providers = Providers::from_chain(
            Provider::new("primary", MockProvider::new()),
            Some(Provider::new("backup", MockProvider::new())),
        );
        let chain = providers.chain(None).unwrap();
        assert_eq!(chain.primary().name, "primary");
        assert_eq!(chain.fallback().map(|p| p.name.as_str()), Some("backup"));
        assert_eq!(
            providers.chain(Some("backup")).unwrap().names(),
            vec!["backup", "primary"]
        );

        let single = Providers::from_chain(Provider::new("only", MockProvider::new()), None);
        let chain = single.chain(None).unwrap();
        assert!(chain.fallback().is_none());
    }

    #[tokio::test]
    async fn test_check_all() {
        let providers = Providers::from_chain(
            Provider::new("up", MockProvider::new()),
            Some(Provider::new("down", MockProvider::new().unhealthy())),
        );
        let statuses = providers.check_all().await;
        // BTreeMap order: "down" < "up"
        assert_eq!(statuses[0].name, "down");
        assert!(!statuses[0].healthy);
        assert!(statuses[1].healthy);
    }
}
