//! Credential Resolution
//!
//! Turns sparse construction options plus an [`EnvSnapshot`] into a
//! concrete provider, API key, base URL and model.
//!
//! Precedence is fixed:
//!
//! 1. An explicitly named provider other than `auto` skips detection
//!    (`custom` then only reads explicit values and the generic `LLM_*`
//!    variables).
//! 2. Otherwise the provider is detected from vendor signal variables,
//!    then from the shape of the API key, then from the base URL, and
//!    finally falls back to `auto`.
//! 3. Key and URL come from: explicit value, provider variables, generic
//!    variable, provider default.
//! 4. Model comes from: explicit value, `LLM_MODEL_ID`, provider default
//!    (inferred from the base URL for `auto`/`custom`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::catalog::{
    DETECTION_ORDER, LLM_API_KEY, LLM_BASE_URL, LLM_MODEL_ID, LLM_TIMEOUT, ProviderKind,
    UNIVERSAL_DEFAULT_MODEL,
};
use super::env::EnvSnapshot;
use crate::error::{AgentError, Result};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];
const LOCAL_SERVER_PORTS: [u16; 3] = [8080, 7860, 5000];

/// Client construction options; every field is optional
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LlmOptions {
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl LlmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }
}

impl std::fmt::Debug for LlmOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmOptions")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fully resolved endpoint. `api_key` and `base_url` are never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub provider: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Sampling and transport settings resolved alongside the credentials
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

/// Resolves credentials against one environment snapshot
pub struct CredentialResolver<'a> {
    env: &'a EnvSnapshot,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(env: &'a EnvSnapshot) -> Self {
        Self { env }
    }

    /// Resolve provider, key, URL and model.
    ///
    /// Fails with [`AgentError::Configuration`] when no usable API key or
    /// base URL can be found, or when the provider name is unknown.
    pub fn resolve(&self, explicit: &LlmOptions) -> Result<ResolvedCredentials> {
        let explicit_key = non_empty(explicit.api_key.as_deref());
        let explicit_url = non_empty(explicit.base_url.as_deref());

        let named = non_empty(explicit.provider.as_deref())
            .map(str::parse::<ProviderKind>)
            .transpose()?;
        let provider = match named {
            Some(ProviderKind::Auto) | None => self.detect_provider(explicit_key, explicit_url),
            Some(kind) => kind,
        };
        let profile = provider.profile();

        let api_key = explicit_key
            .or_else(|| self.env.first_of(profile.key_vars))
            .or_else(|| self.env.get(LLM_API_KEY))
            .or(profile.key_placeholder)
            .ok_or_else(|| {
                AgentError::Configuration(format!(
                    "no API key found for provider '{}'; pass one explicitly or set {}",
                    provider,
                    key_hint(provider)
                ))
            })?;

        let base_url = explicit_url
            .or_else(|| self.env.first_of(profile.host_vars))
            .or_else(|| self.env.get(LLM_BASE_URL))
            .or(profile.default_base_url)
            .ok_or_else(|| {
                AgentError::Configuration(format!(
                    "no base URL found for provider '{}'; pass one explicitly or set {}",
                    provider, LLM_BASE_URL
                ))
            })?;

        let model = non_empty(explicit.model.as_deref())
            .or_else(|| self.env.get(LLM_MODEL_ID))
            .or(profile.default_model)
            .unwrap_or_else(|| infer_model_from_url(base_url));

        tracing::debug!(
            provider = %provider,
            base_url = %base_url,
            model = %model,
            "Resolved LLM credentials"
        );

        Ok(ResolvedCredentials {
            provider,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim().to_string(),
            model: model.to_string(),
        })
    }

    /// Resolve temperature, token limit and timeout
    pub fn settings(&self, explicit: &LlmOptions) -> ClientSettings {
        let timeout = explicit
            .timeout
            .or_else(|| {
                self.env
                    .get(LLM_TIMEOUT)
                    .and_then(|v| v.trim().parse::<u64>().ok())
            })
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        ClientSettings {
            temperature: explicit.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: explicit.max_tokens,
            timeout: Duration::from_secs(timeout),
        }
    }

    /// Detect a provider from the environment, the key and the URL.
    ///
    /// `api_key`/`base_url` are the explicit values; the generic
    /// variables stand in for them when absent.
    pub fn detect_provider(&self, api_key: Option<&str>, base_url: Option<&str>) -> ProviderKind {
        let api_key = api_key.or_else(|| self.env.get(LLM_API_KEY));
        let base_url = base_url.or_else(|| self.env.get(LLM_BASE_URL));

        self.detect_from_env()
            .or_else(|| api_key.and_then(detect_from_key))
            .or_else(|| base_url.and_then(|url| detect_from_url(url, api_key)))
            .unwrap_or(ProviderKind::Auto)
    }

    fn detect_from_env(&self) -> Option<ProviderKind> {
        DETECTION_ORDER
            .into_iter()
            .find(|kind| kind.profile().signal_vars().any(|var| self.env.contains(var)))
    }
}

/// Resolve with an explicit environment snapshot
pub fn resolve(explicit: &LlmOptions, env: &EnvSnapshot) -> Result<ResolvedCredentials> {
    CredentialResolver::new(env).resolve(explicit)
}

/// Default model implied by a base URL, for providers without their own
pub fn infer_model_from_url(base_url: &str) -> &'static str {
    detect_from_url(base_url, None)
        .and_then(|kind| kind.profile().default_model)
        .unwrap_or(UNIVERSAL_DEFAULT_MODEL)
}

fn detect_from_key(api_key: &str) -> Option<ProviderKind> {
    if let Some(kind) = keyless_literal(api_key) {
        return Some(kind);
    }
    if api_key.starts_with("ms-") {
        return Some(ProviderKind::ModelScope);
    }
    if looks_like_zhipu_key(api_key) {
        return Some(ProviderKind::Zhipu);
    }
    // `sk-` keys are shared by several vendors and decide nothing.
    None
}

fn keyless_literal(api_key: &str) -> Option<ProviderKind> {
    match api_key.trim().to_ascii_lowercase().as_str() {
        "ollama" => Some(ProviderKind::Ollama),
        "vllm" => Some(ProviderKind::Vllm),
        "local" => Some(ProviderKind::Local),
        _ => None,
    }
}

/// `<id>.<secret>`: long, hyphen-free, two alphanumeric halves
fn looks_like_zhipu_key(api_key: &str) -> bool {
    if api_key.len() <= 40 || api_key.contains('-') {
        return false;
    }
    match api_key.split_once('.') {
        Some((id, secret)) => {
            !id.is_empty()
                && !secret.is_empty()
                && id.chars().all(|c| c.is_ascii_alphanumeric())
                && secret.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn detect_from_url(base_url: &str, api_key: Option<&str>) -> Option<ProviderKind> {
    let parsed = Url::parse(base_url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let port = parsed.port();
    let path = parsed.path().to_ascii_lowercase();

    let hosted = DETECTION_ORDER.into_iter().find(|kind| {
        kind.profile()
            .url_hint
            .is_some_and(|hint| host_matches(&host, hint))
    });
    if hosted.is_some() {
        return hosted;
    }

    if LOOPBACK_HOSTS.contains(&host.as_str()) {
        let kind = if port == Some(11434) || path.contains("ollama") {
            ProviderKind::Ollama
        } else if port == Some(8000) || path.contains("vllm") {
            ProviderKind::Vllm
        } else if matches!(port, Some(8080 | 7860)) {
            ProviderKind::Local
        } else {
            api_key
                .and_then(keyless_literal)
                .unwrap_or(ProviderKind::Local)
        };
        return Some(kind);
    }

    if port.is_some_and(|p| LOCAL_SERVER_PORTS.contains(&p)) {
        return Some(ProviderKind::Local);
    }

    None
}

/// `hint` itself or any subdomain of it
fn host_matches(host: &str, hint: &str) -> bool {
    host == hint
        || host
            .strip_suffix(hint)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn key_hint(provider: ProviderKind) -> String {
    let mut vars: Vec<&str> = provider.profile().key_vars.to_vec();
    vars.push(LLM_API_KEY);
    vars.join(" or ")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
