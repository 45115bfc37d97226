use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{ChatError, CoreResult};

pub const ENV_LANGSMITH_API_KEY: &str = "LANGSMITH_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_LANGSMITH_PROJECT: &str = "LANGSMITH_PROJECT";
pub const ENV_ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";
pub const ENV_LANGSMITH_OTEL_ENDPOINT: &str = "LANGSMITH_OTEL_ENDPOINT";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelCfg {
    /// Model id sent on every Messages API call.
    #[serde(default = "default_model")]
    pub model: String,
    /// Output token budget per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_base")]
    pub base_url: String,
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: default_anthropic_base(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

/// OTLP export settings for the turn tracer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TracingCfg {
    /// Full OTLP/HTTP traces URL, used as-is.
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    /// Batch processor scheduled delay.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Upper bound for the blocking flush on quit.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for TracingCfg {
    fn default() -> Self {
        Self {
            endpoint: default_otel_endpoint(),
            batch_timeout_ms: default_batch_timeout_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

fn default_otel_endpoint() -> String {
    "https://api.smith.langchain.com/otel/v1/traces".to_string()
}
fn default_batch_timeout_ms() -> u64 {
    1_000
}
fn default_flush_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub tracing: TracingCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(ChatError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| ChatError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| ChatError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into())))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make every exit flush fail or every call error.
    pub fn validate(&self) -> CoreResult<()> {
        if self.tracing.flush_timeout_ms == 0 {
            return Err(ChatError::Validation(
                "tracing.flush_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(ChatError::Validation(
                "model.max_tokens must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Endpoint overrides from the process environment win over file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = non_empty(lookup(ENV_ANTHROPIC_BASE_URL)) {
            self.model.base_url = base;
        }
        if let Some(endpoint) = non_empty(lookup(ENV_LANGSMITH_OTEL_ENDPOINT)) {
            self.tracing.endpoint = endpoint;
        }
    }
}

/// API keys and the optional project override, read once at startup.
#[derive(Debug)]
pub struct Credentials {
    pub langsmith_api_key: SecretString,
    pub anthropic_api_key: SecretString,
    pub project_name: Option<String>,
}

impl Credentials {
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let langsmith = non_empty(lookup(ENV_LANGSMITH_API_KEY))
            .ok_or(ChatError::MissingEnv(ENV_LANGSMITH_API_KEY))?;
        let anthropic = non_empty(lookup(ENV_ANTHROPIC_API_KEY))
            .ok_or(ChatError::MissingEnv(ENV_ANTHROPIC_API_KEY))?;
        Ok(Self {
            langsmith_api_key: SecretString::new(langsmith.into()),
            anthropic_api_key: SecretString::new(anthropic.into()),
            project_name: non_empty(lookup(ENV_LANGSMITH_PROJECT)),
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}
