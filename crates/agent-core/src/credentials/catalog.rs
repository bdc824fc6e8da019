//! Provider Catalog
//!
//! Static table of the OpenAI-compatible vendors the resolver knows about.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AgentError;

/// Generic API key variable, honoured by every provider
pub const LLM_API_KEY: &str = "LLM_API_KEY";
/// Generic base URL variable
pub const LLM_BASE_URL: &str = "LLM_BASE_URL";
/// Generic model variable
pub const LLM_MODEL_ID: &str = "LLM_MODEL_ID";
/// Request timeout in seconds
pub const LLM_TIMEOUT: &str = "LLM_TIMEOUT";

/// Model used when neither the provider nor the base URL implies one
pub const UNIVERSAL_DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Known provider identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Qwen,
    ModelScope,
    Kimi,
    Zhipu,
    Ollama,
    Vllm,
    Local,
    Custom,
    Auto,
}

/// Vendors in the order their signal variables are scanned.
///
/// When several vendors are configured at once the first one listed here
/// wins; reordering this array changes observable behaviour.
pub const DETECTION_ORDER: [ProviderKind; 8] = [
    ProviderKind::OpenAi,
    ProviderKind::DeepSeek,
    ProviderKind::Qwen,
    ProviderKind::ModelScope,
    ProviderKind::Kimi,
    ProviderKind::Zhipu,
    ProviderKind::Ollama,
    ProviderKind::Vllm,
];

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Qwen => "qwen",
            ProviderKind::ModelScope => "modelscope",
            ProviderKind::Kimi => "kimi",
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Vllm => "vllm",
            ProviderKind::Local => "local",
            ProviderKind::Custom => "custom",
            ProviderKind::Auto => "auto",
        }
    }

    /// Static profile for this provider
    pub fn profile(self) -> &'static ProviderProfile {
        match self {
            ProviderKind::OpenAi => &OPENAI,
            ProviderKind::DeepSeek => &DEEPSEEK,
            ProviderKind::Qwen => &QWEN,
            ProviderKind::ModelScope => &MODELSCOPE,
            ProviderKind::Kimi => &KIMI,
            ProviderKind::Zhipu => &ZHIPU,
            ProviderKind::Ollama => &OLLAMA,
            ProviderKind::Vllm => &VLLM,
            ProviderKind::Local => &LOCAL,
            ProviderKind::Custom => &CUSTOM,
            ProviderKind::Auto => &AUTO,
        }
    }

    /// Providers that serve without authentication
    pub fn is_keyless(self) -> bool {
        self.profile().key_placeholder.is_some()
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "qwen" | "dashscope" => Ok(ProviderKind::Qwen),
            "modelscope" => Ok(ProviderKind::ModelScope),
            "kimi" | "moonshot" => Ok(ProviderKind::Kimi),
            "zhipu" | "glm" => Ok(ProviderKind::Zhipu),
            "ollama" => Ok(ProviderKind::Ollama),
            "vllm" => Ok(ProviderKind::Vllm),
            "local" => Ok(ProviderKind::Local),
            "custom" => Ok(ProviderKind::Custom),
            "auto" => Ok(ProviderKind::Auto),
            other => Err(AgentError::Configuration(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// Immutable description of one provider
#[derive(Debug)]
pub struct ProviderProfile {
    pub kind: ProviderKind,

    /// Provider-specific API key variables, tried in order
    pub key_vars: &'static [&'static str],

    /// Host override variables for self-hosted vendors
    pub host_vars: &'static [&'static str],

    pub default_base_url: Option<&'static str>,

    pub default_model: Option<&'static str>,

    /// Hostname/path substring identifying a hosted vendor
    pub url_hint: Option<&'static str>,

    /// Stand-in key for unauthenticated local servers
    pub key_placeholder: Option<&'static str>,
}

impl ProviderProfile {
    /// Every variable whose presence selects this provider
    pub fn signal_vars(&self) -> impl Iterator<Item = &'static str> {
        self.key_vars.iter().chain(self.host_vars.iter()).copied()
    }
}

static OPENAI: ProviderProfile = ProviderProfile {
    kind: ProviderKind::OpenAi,
    key_vars: &["OPENAI_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://api.openai.com/v1"),
    default_model: Some("gpt-3.5-turbo"),
    url_hint: Some("api.openai.com"),
    key_placeholder: None,
};

static DEEPSEEK: ProviderProfile = ProviderProfile {
    kind: ProviderKind::DeepSeek,
    key_vars: &["DEEPSEEK_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://api.deepseek.com"),
    default_model: Some("deepseek-chat"),
    url_hint: Some("api.deepseek.com"),
    key_placeholder: None,
};

static QWEN: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Qwen,
    key_vars: &["DASHSCOPE_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
    default_model: Some("qwen-plus"),
    url_hint: Some("dashscope.aliyuncs.com"),
    key_placeholder: None,
};

static MODELSCOPE: ProviderProfile = ProviderProfile {
    kind: ProviderKind::ModelScope,
    key_vars: &["MODELSCOPE_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://api-inference.modelscope.cn/v1/"),
    default_model: Some("Qwen/Qwen2.5-72B-Instruct"),
    url_hint: Some("api-inference.modelscope.cn"),
    key_placeholder: None,
};

static KIMI: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Kimi,
    key_vars: &["KIMI_API_KEY", "MOONSHOT_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://api.moonshot.cn/v1"),
    default_model: Some("moonshot-v1-8k"),
    url_hint: Some("api.moonshot.cn"),
    key_placeholder: None,
};

static ZHIPU: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Zhipu,
    key_vars: &["ZHIPU_API_KEY", "GLM_API_KEY"],
    host_vars: &[],
    default_base_url: Some("https://open.bigmodel.cn/api/paas/v4"),
    default_model: Some("glm-4"),
    url_hint: Some("open.bigmodel.cn"),
    key_placeholder: None,
};

static OLLAMA: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Ollama,
    key_vars: &["OLLAMA_API_KEY"],
    host_vars: &["OLLAMA_HOST"],
    default_base_url: Some("http://localhost:11434/v1"),
    default_model: Some("llama3.2"),
    url_hint: None,
    key_placeholder: Some("ollama"),
};

static VLLM: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Vllm,
    key_vars: &["VLLM_API_KEY"],
    host_vars: &["VLLM_HOST"],
    default_base_url: Some("http://localhost:8000/v1"),
    default_model: Some("meta-llama/Llama-2-7b-chat-hf"),
    url_hint: None,
    key_placeholder: Some("vllm"),
};

static LOCAL: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Local,
    key_vars: &[],
    host_vars: &[],
    default_base_url: Some("http://localhost:8000/v1"),
    default_model: Some("local-model"),
    url_hint: None,
    key_placeholder: Some("local"),
};

static CUSTOM: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Custom,
    key_vars: &[],
    host_vars: &[],
    default_base_url: None,
    default_model: None,
    url_hint: None,
    key_placeholder: None,
};

static AUTO: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Auto,
    key_vars: &[],
    host_vars: &[],
    default_base_url: None,
    default_model: None,
    url_hint: None,
    key_placeholder: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("moonshot".parse::<ProviderKind>().unwrap(), ProviderKind::Kimi);
        assert_eq!(" glm ".parse::<ProviderKind>().unwrap(), ProviderKind::Zhipu);
        assert!(matches!(
            "bedrock".parse::<ProviderKind>(),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn test_profiles_match_their_kind() {
        for kind in DETECTION_ORDER {
            let profile = kind.profile();
            assert_eq!(profile.kind, kind);
            assert!(profile.signal_vars().next().is_some(), "{kind} has no signal");
            assert!(profile.default_base_url.is_some());
        }
    }

    #[test]
    fn test_keyless_providers() {
        assert!(ProviderKind::Ollama.is_keyless());
        assert!(ProviderKind::Local.is_keyless());
        assert!(!ProviderKind::OpenAi.is_keyless());
        assert!(!ProviderKind::Custom.is_keyless());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let kind: ProviderKind = ProviderKind::ModelScope.to_string().parse().unwrap();
        assert_eq!(kind, ProviderKind::ModelScope);
    }
}
