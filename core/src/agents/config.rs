use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::{SettingsStore, StoreError};

/// Store key holding the persisted credential as a raw string.
pub const CREDENTIAL_KEY: &str = "strudel-ai-api-key";
/// Store key holding the persisted [`PartialConfig`] as JSON.
pub const CONFIG_KEY: &str = "strudel-ai-config";

pub const ENV_API_KEY: &str = "STRUDEL_AI_API_KEY";
pub const ENV_API_URL: &str = "STRUDEL_AI_API_URL";
pub const ENV_MODEL: &str = "STRUDEL_AI_MODEL";
pub const ENV_TEMPERATURE: &str = "STRUDEL_AI_TEMPERATURE";
pub const ENV_MAX_TOKENS: &str = "STRUDEL_AI_MAX_TOKENS";

pub const LEGACY_ENV_API_KEY: &str = "PUBLIC_LLM_API_KEY";
pub const LEGACY_ENV_API_URL: &str = "PUBLIC_LLM_API_URL";
pub const LEGACY_ENV_MODEL: &str = "PUBLIC_LLM_MODEL";

pub const DEFAULT_ENDPOINT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

const LOG_TARGET: &str = "strudel_ai::config";

/// A persisted configuration layer that could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("persisted configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("persisted configuration is invalid: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Effective settings for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub endpoint_url: String,
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// A subset of [`Configuration`] fields contributed by one layer.
///
/// `None` means "not set here" and never masks a lower layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl PartialConfig {
    /// Fields of `self` win over fields of `lower`.
    pub fn overlay(self, lower: PartialConfig) -> PartialConfig {
        PartialConfig {
            endpoint_url: self.endpoint_url.or(lower.endpoint_url),
            model_id: self.model_id.or(lower.model_id),
            temperature: self.temperature.or(lower.temperature),
            max_tokens: self.max_tokens.or(lower.max_tokens),
        }
    }

    fn apply_to(&self, base: &mut Configuration) {
        if let Some(url) = &self.endpoint_url {
            base.endpoint_url = url.clone();
        }
        if let Some(model) = &self.model_id {
            base.model_id = model.clone();
        }
        if let Some(temperature) = self.temperature {
            base.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            base.max_tokens = Some(max_tokens);
        }
    }

    /// Normalise blank strings to unset and reject out-of-range values.
    pub fn validate(self) -> Result<PartialConfig, ConfigError> {
        let endpoint_url = non_blank(self.endpoint_url);
        if let Some(url) = &endpoint_url {
            let parsed = Url::parse(url)
                .map_err(|err| ConfigError::Invalid(format!("endpointUrl '{url}': {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "endpointUrl '{url}' must use http or https"
                )));
            }
        }
        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Invalid(format!(
                    "temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ConfigError::Invalid("maxTokens must be positive".into()));
        }
        Ok(PartialConfig {
            endpoint_url,
            model_id: non_blank(self.model_id),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration sources, ordered by increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConfigLayer {
    BuiltInDefault,
    EnvironmentDefault,
    Persisted,
}

/// Merge layers field by field over `base`; higher layers mask lower ones.
pub fn merge_layers(base: &Configuration, layers: &[(ConfigLayer, PartialConfig)]) -> Configuration {
    let mut ordered: Vec<&(ConfigLayer, PartialConfig)> = layers.iter().collect();
    ordered.sort_by_key(|(layer, _)| *layer);
    let mut resolved = base.clone();
    for (_, partial) in ordered {
        partial.apply_to(&mut resolved);
    }
    resolved
}

/// Opaque bearer secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Settings supplied by the process environment, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentDefaults {
    pub credential: Option<String>,
    pub config: PartialConfig,
}

impl EnvironmentDefaults {
    pub fn from_env() -> Self {
        let defaults = Self::from_vars(std::env::vars());
        log::info!(
            target: LOG_TARGET,
            "environment config loaded: has_api_key={} api_url={:?} model={:?}",
            defaults.credential.is_some(),
            defaults.config.endpoint_url,
            defaults.config.model_id
        );
        defaults
    }

    /// `STRUDEL_AI_*` names win over the `PUBLIC_LLM_*` names read from
    /// older `.env` files, whatever order the variables arrive in.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut primary = Self::default();
        let mut legacy = Self::default();
        for (key, value) in vars {
            let value: String = value.into();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let (target, name) = match legacy_alias(key.as_ref()) {
                Some(name) => (&mut legacy, name),
                None => (&mut primary, key.as_ref()),
            };
            target.apply_var(name, value);
        }
        Self {
            credential: primary.credential.or(legacy.credential),
            config: primary.config.overlay(legacy.config),
        }
    }

    fn apply_var(&mut self, name: &str, value: &str) {
        match name {
            ENV_API_KEY => self.credential = Some(value.to_string()),
            ENV_API_URL => self.config.endpoint_url = Some(value.to_string()),
            ENV_MODEL => self.config.model_id = Some(value.to_string()),
            ENV_TEMPERATURE => match value.parse::<f64>() {
                Ok(t) if t.is_finite() && (0.0..=2.0).contains(&t) => {
                    self.config.temperature = Some(t)
                }
                _ => log::warn!(target: LOG_TARGET, "ignoring {ENV_TEMPERATURE}={value:?}"),
            },
            ENV_MAX_TOKENS => match value.parse::<u32>() {
                Ok(n) if n > 0 => self.config.max_tokens = Some(n),
                _ => log::warn!(target: LOG_TARGET, "ignoring {ENV_MAX_TOKENS}={value:?}"),
            },
            _ => {}
        }
    }
}

fn legacy_alias(key: &str) -> Option<&'static str> {
    match key {
        LEGACY_ENV_API_KEY => Some(ENV_API_KEY),
        LEGACY_ENV_API_URL => Some(ENV_API_URL),
        LEGACY_ENV_MODEL => Some(ENV_MODEL),
        _ => None,
    }
}

/// Merges persisted, environment and built-in settings.
///
/// Nothing is cached: every call reads the store again so settings changes
/// apply to the next request.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn SettingsStore>,
    environment: EnvironmentDefaults,
    builtin: Configuration,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn SettingsStore>, environment: EnvironmentDefaults) -> Self {
        Self {
            store,
            environment,
            builtin: Configuration::default(),
        }
    }

    pub fn with_builtin(mut self, builtin: Configuration) -> Self {
        self.builtin = builtin;
        self
    }

    pub fn resolve_config(&self) -> Configuration {
        self.resolve_config_with_diagnostics().0
    }

    /// Like [`resolve_config`](Self::resolve_config) but also hands back the
    /// reason a persisted layer was discarded, if any.
    pub fn resolve_config_with_diagnostics(&self) -> (Configuration, Option<ConfigError>) {
        let mut layers = vec![(ConfigLayer::EnvironmentDefault, self.environment.config.clone())];
        let mut discarded = None;
        match self.read_persisted_config() {
            Ok(Some(persisted)) => layers.push((ConfigLayer::Persisted, persisted)),
            Ok(None) => {}
            Err(err) => {
                log::warn!(target: LOG_TARGET, "discarding persisted configuration: {err}");
                discarded = Some(err);
            }
        }
        (merge_layers(&self.builtin, &layers), discarded)
    }

    pub fn resolve_credential(&self) -> Option<Credential> {
        self.persisted_credential()
            .or_else(|| self.environment.credential.clone())
            .map(Credential)
    }

    /// Which layer the effective credential comes from.
    pub fn credential_source(&self) -> Option<ConfigLayer> {
        if self.persisted_credential().is_some() {
            Some(ConfigLayer::Persisted)
        } else if self.environment.credential.is_some() {
            Some(ConfigLayer::EnvironmentDefault)
        } else {
            None
        }
    }

    pub fn is_credential_configured(&self) -> bool {
        self.resolve_credential().is_some()
    }

    pub fn is_credential_from_environment_only(&self) -> bool {
        self.environment.credential.is_some() && self.persisted_credential().is_none()
    }

    /// Write `partial` over whatever was persisted before. Unset fields keep
    /// their previously persisted value; lower layers are never written.
    pub fn persist_config(&self, partial: PartialConfig) -> Result<(), ConfigError> {
        let partial = partial.validate()?;
        let previous = match self.read_persisted_config() {
            Ok(previous) => previous.unwrap_or_default(),
            Err(ConfigError::Store(err)) => return Err(ConfigError::Store(err)),
            Err(err) => {
                log::warn!(target: LOG_TARGET, "overwriting unreadable persisted configuration: {err}");
                PartialConfig::default()
            }
        };
        let merged = partial.overlay(previous);
        let raw = serde_json::to_string(&merged)?;
        self.store.set(CONFIG_KEY, &raw)?;
        Ok(())
    }

    /// Drop every persisted configuration field.
    pub fn reset_config(&self) -> Result<(), ConfigError> {
        self.store.set(CONFIG_KEY, "{}")?;
        Ok(())
    }

    /// Unconditional write; an empty value clears the persisted credential.
    pub fn persist_credential(&self, value: &str) -> Result<(), StoreError> {
        self.store.set(CREDENTIAL_KEY, value)
    }

    fn read_persisted_config(&self) -> Result<Option<PartialConfig>, ConfigError> {
        let Some(raw) = self.store.get(CONFIG_KEY)? else {
            return Ok(None);
        };
        let partial: PartialConfig = serde_json::from_str(&raw)?;
        partial.validate().map(Some)
    }

    fn persisted_credential(&self) -> Option<String> {
        match self.store.get(CREDENTIAL_KEY) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(err) => {
                log::warn!(target: LOG_TARGET, "could not read persisted credential: {err}");
                None
            }
        }
    }
}
