use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FALLBACK_DELAY_MS: u64 = 1000;
pub const MAX_FALLBACK_DELAY_MS: u64 = 1500;
pub const CREDENTIAL_KEY: &str = "openai_api_key";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_STORE_PATH: &str = "EMOTION2POEM_STORE";
const STORE_DIR: &str = "emotion2poem";
const STORE_FILE: &str = "store.json";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

/// Artificial pause before a fallback poem is handed back, so the bank
/// feels like it is composing rather than reciting.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackDelay {
    pub millis: u64,
}

impl FallbackDelay {
    pub fn new(millis: u64) -> Result<Self, ConfigError> {
        if millis > MAX_FALLBACK_DELAY_MS {
            return Err(ConfigError::FallbackDelayTooLong {
                millis,
                max: MAX_FALLBACK_DELAY_MS,
            });
        }
        Ok(Self { millis })
    }

    pub fn none() -> Self {
        Self { millis: 0 }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_owned(),
            model,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("model must not be empty")]
    EmptyModel,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("fallback delay {millis} ms exceeds {max} ms")]
    FallbackDelayTooLong { millis: u64, max: u64 },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) if !v.trim().is_empty() => Ok(Some(ApiKey::new(v)?)),
            _ => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

/// Where the durable key-value store lives: explicit value, then
/// `EMOTION2POEM_STORE`, then the XDG config dir, then `~/.config`.
pub fn resolve_store_path(cli_value: Option<String>, env: &impl Env) -> PathBuf {
    if let Some(path) = resolve_optional_string(cli_value, ENV_STORE_PATH, env) {
        return PathBuf::from(path);
    }
    let config_dir = env
        .var("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env.var("HOME").map(|home| PathBuf::from(home).join(".config")));
    match config_dir {
        Some(dir) => dir.join(STORE_DIR).join(STORE_FILE),
        None => PathBuf::from(format!("{STORE_DIR}-{STORE_FILE}")),
    }
}
