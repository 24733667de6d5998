//! Provider and environment configuration
//!
//! Provider settings are loaded with a two-layer resolution:
//! 1. An override file: `TALLY_PROVIDERS_CONFIG`, else
//!    `~/.local/share/tally/config/providers.toml` if it exists
//! 2. The embedded defaults (compiled into binary)
//!
//! The result is an immutable [`ProviderSettings`] value. The default primary
//! provider can be replaced with `TALLY_PROVIDER` at load time; everything
//! else that varies per call (a provider override for one request) is passed
//! in explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/providers.toml");

/// Explicit providers.toml path
pub const PROVIDERS_CONFIG_ENV: &str = "TALLY_PROVIDERS_CONFIG";

/// Replaces the configured default primary provider
pub const PROVIDER_ENV: &str = "TALLY_PROVIDER";

/// Deployment profile (development, testing, production)
pub const PROFILE_ENV: &str = "TALLY_ENV";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Deployment profile selecting the default database location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Development,
    Testing,
    Production,
}

impl Profile {
    /// Profile from `TALLY_ENV`, development when unset or unrecognized
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn default_db_path(&self) -> &'static str {
        match self {
            Self::Development => "db/dev.db",
            Self::Testing => "db/test.db",
            Self::Production => "db/prod.db",
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::Config(format!("Unknown profile: {}", other))),
        }
    }
}

/// Which wire protocol a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `POST {host}/v1/chat/completions`
    #[default]
    OpenaiCompatible,
    /// Ollama's native `/api/chat`
    Ollama,
    /// Scripted in-process provider (tests, offline demos)
    Mock,
}

/// One configured completion provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub backend: BackendKind,
    pub host: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    /// Extra fields merged into every request body
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra_body: serde_json::Map<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Immutable provider configuration: defaults plus all known providers
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSettings {
    pub primary: String,
    pub fallback: Option<String>,
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Where the settings were read from (`None` for embedded defaults)
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ProviderSettings {
    /// Load settings from the override file or embedded defaults, then apply
    /// `TALLY_PROVIDER`
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(PROVIDERS_CONFIG_ENV).ok().map(PathBuf::from);
        let mut settings = Self::load_from(explicit.as_deref())?;

        if let Ok(primary) = std::env::var(PROVIDER_ENV) {
            if !primary.trim().is_empty() {
                settings = settings.with_primary(primary.trim())?;
            }
        }
        Ok(settings)
    }

    /// Load from an explicit path, the default override location, or the
    /// embedded defaults
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// override is not.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) if !p.exists() => {
                return Err(Error::Config(format!(
                    "Provider config not found: {}",
                    p.display()
                )))
            }
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                let mut settings = Self::from_toml(&content)?;
                debug!(path = %path.display(), "Loaded provider config override");
                settings.source = Some(path);
                Ok(settings)
            }
            None => Self::embedded(),
        }
    }

    /// The compiled-in defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        let defaults = raw.defaults.unwrap_or_default();
        let timeout_secs = defaults.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let providers: BTreeMap<String, ProviderConfig> = raw
            .providers
            .into_iter()
            .map(|(name, p)| {
                let config = ProviderConfig {
                    name: name.clone(),
                    backend: p.backend.unwrap_or_default(),
                    host: p.host.trim_end_matches('/').to_string(),
                    model: p.model,
                    api_key_env: p.api_key_env,
                    timeout_secs: p.timeout_secs.unwrap_or(timeout_secs),
                    temperature: p.temperature.or(defaults.temperature),
                    extra_body: p.extra_body.unwrap_or_default(),
                };
                (name, config)
            })
            .collect();

        let primary = match defaults.primary {
            Some(primary) => primary,
            None => providers
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| Error::Config("No providers configured".into()))?,
        };

        let settings = Self {
            primary,
            fallback: defaults.fallback.filter(|f| !f.is_empty()),
            providers,
            source: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for name in std::iter::once(&self.primary).chain(self.fallback.as_ref()) {
            if !self.providers.contains_key(name) {
                return Err(Error::Config(format!("Unknown provider: {}", name)));
            }
        }
        // A zero timeout fails every call before it is sent
        if let Some(provider) = self.providers.values().find(|p| p.timeout_secs == 0) {
            return Err(Error::Config(format!(
                "timeout_secs must be positive for provider: {}",
                provider.name
            )));
        }
        Ok(())
    }

    /// Same settings with a different default primary
    pub fn with_primary(mut self, name: &str) -> Result<Self> {
        if !self.providers.contains_key(name) {
            return Err(Error::Config(format!("Unknown provider: {}", name)));
        }
        if self.fallback.as_deref() == Some(name) {
            self.fallback = Some(self.primary.clone());
        }
        self.primary = name.to_string();
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Provider names to try in order, at most two
    ///
    /// `requested` replaces the primary for one call. When it names the
    /// configured fallback, the configured primary becomes the fallback.
    pub fn chain_order(&self, requested: Option<&str>) -> Result<Vec<String>> {
        let primary = requested.map(str::trim).filter(|s| !s.is_empty());
        let primary = match primary {
            Some(name) if !self.providers.contains_key(name) => {
                return Err(Error::Config(format!("Unknown provider: {}", name)))
            }
            Some(name) => name,
            None => self.primary.as_str(),
        };

        let fallback = if self.fallback.as_deref() == Some(primary) {
            Some(self.primary.as_str())
        } else {
            self.fallback.as_deref()
        };

        let mut order = vec![primary.to_string()];
        if let Some(fallback) = fallback.filter(|f| *f != primary) {
            order.push(fallback.to_string());
        }
        Ok(order)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("providers.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawDefaults>,
    #[serde(default)]
    providers: BTreeMap<String, RawProvider>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    primary: Option<String>,
    fallback: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    backend: Option<BackendKind>,
    host: String,
    model: String,
    api_key_env: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    extra_body: Option<serde_json::Map<String, serde_json::Value>>,
}
