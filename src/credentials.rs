//! Provider credentials and the resolver seam that hands them out.
//!
//! Every job operation takes an [`IntegrationConfig`] snapshot as a parameter;
//! nothing in the crate caches credentials behind a global.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// The asynchronous image/video relay (`/mj/...` endpoints).
    Midjourney,
    /// The synchronous multimodal `generateContent` API.
    Gemini,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Midjourney => "midjourney",
            ProviderId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midjourney" | "mj" | "relay" => Ok(ProviderId::Midjourney),
            "gemini" => Ok(ProviderId::Gemini),
            other => Err(AppError::Configuration(format!("unknown provider '{}'", other))),
        }
    }
}

/// Resolved credentials for one integration. Read-only per operation.
#[derive(Clone)]
pub struct IntegrationConfig {
    pub integration_id: String,
    pub provider: ProviderId,
    pub base_url: String,
    pub auth_token: String,
    /// Generation mode of the integration, e.g. `photo` or `video`.
    pub mode: String,
    /// Name of the shared-secret header sent alongside the bearer token.
    pub secret_header: String,
    /// Default model for providers that address models in the URL.
    pub model: Option<String>,
}

impl IntegrationConfig {
    pub fn masked_token(&self) -> String {
        mask_token(&self.auth_token)
    }

    /// Join `path` onto the base URL without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("integration_id", &self.integration_id)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("auth_token", &self.masked_token())
            .field("mode", &self.mode)
            .field("secret_header", &self.secret_header)
            .field("model", &self.model)
            .finish()
    }
}

/// Show the first and last four characters of a secret, eliding the rest.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Supplies credentials for the active integration of a provider.
///
/// Implementations fail with [`AppError::Configuration`] when the integration
/// is disabled or incomplete.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, provider: ProviderId) -> AppResult<IntegrationConfig>;
}

/// Resolver backed by the env-driven [`Config`].
pub struct ConfigCredentialResolver {
    config: Config,
}

impl ConfigCredentialResolver {
    pub fn new(config: Config) -> Self {
        ConfigCredentialResolver { config }
    }
}

impl CredentialResolver for ConfigCredentialResolver {
    fn resolve(&self, provider: ProviderId) -> AppResult<IntegrationConfig> {
        let cfg = &self.config;
        match provider {
            ProviderId::Midjourney => {
                if !cfg.relay_enabled {
                    return Err(AppError::Configuration("relay integration is disabled".into()));
                }
                let base_url = cfg
                    .relay_base_url
                    .clone()
                    .ok_or_else(|| AppError::Configuration("RELAY_BASE_URL is not set".into()))?;
                let auth_token = cfg
                    .relay_token
                    .clone()
                    .ok_or_else(|| AppError::Configuration("RELAY_TOKEN is not set".into()))?;
                Ok(IntegrationConfig {
                    integration_id: "env:midjourney".into(),
                    provider,
                    base_url,
                    auth_token,
                    mode: cfg.relay_mode.clone(),
                    secret_header: cfg.relay_secret_header.clone(),
                    model: None,
                })
            }
            ProviderId::Gemini => {
                if !cfg.gemini_enabled {
                    return Err(AppError::Configuration("gemini integration is disabled".into()));
                }
                let auth_token = cfg
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| AppError::Configuration("GEMINI_API_KEY is not set".into()))?;
                Ok(IntegrationConfig {
                    integration_id: "env:gemini".into(),
                    provider,
                    base_url: cfg.gemini_base_url.clone(),
                    auth_token,
                    mode: "photo".into(),
                    secret_header: "x-goog-api-key".into(),
                    model: Some(cfg.gemini_model.clone()),
                })
            }
        }
    }
}

/// Fixed set of credentials, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialResolver {
    entries: HashMap<ProviderId, IntegrationConfig>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, config: IntegrationConfig) -> Self {
        self.entries.insert(config.provider, config);
        self
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve(&self, provider: ProviderId) -> AppResult<IntegrationConfig> {
        self.entries.get(&provider).cloned().ok_or_else(|| {
            AppError::Configuration(format!("no integration configured for {}", provider))
        })
    }
}
