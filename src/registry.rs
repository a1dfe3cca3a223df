use regex::Regex;
use std::sync::OnceLock;

/// Read-only description of a known upstream provider family. The table is
/// initialized once at startup and never mutated.
#[derive(Debug)]
pub struct ProviderProfile {
    pub id: &'static str,
    pub name: &'static str,
    /// Needle matched against the hostname of the request's base URL.
    pub host: &'static str,
    pub key_format: Regex,
    pub key_format_hint: &'static str,
    pub default_model: Option<&'static str>,
    pub models: &'static [&'static str],
    /// Endpoint paths embed a caller-specific bot id instead of a model name.
    pub bot_scoped: bool,
}

pub const FALLBACK_MODEL: &str = "gpt-3.5-turbo";

static PROVIDERS: OnceLock<Vec<ProviderProfile>> = OnceLock::new();

pub fn providers() -> &'static [ProviderProfile] {
    PROVIDERS.get_or_init(|| {
        vec![
            ProviderProfile {
                id: "openai",
                name: "OpenAI",
                host: "api.openai.com",
                key_format: Regex::new(r"^sk-[A-Za-z0-9]{48,}$").unwrap(),
                key_format_hint: "sk- followed by 48+ alphanumeric characters",
                default_model: Some("gpt-3.5-turbo"),
                models: &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo-preview"],
                bot_scoped: false,
            },
            ProviderProfile {
                id: "deepseek",
                name: "DeepSeek",
                host: "api.deepseek.com",
                key_format: Regex::new(r"^sk-[A-Za-z0-9]{48,}$").unwrap(),
                key_format_hint: "sk- followed by 48+ alphanumeric characters",
                default_model: Some("deepseek-chat"),
                models: &["deepseek-chat", "deepseek-coder"],
                bot_scoped: false,
            },
            ProviderProfile {
                id: "moonshot",
                name: "Moonshot AI",
                host: "api.moonshot.cn",
                key_format: Regex::new(r"^sk-[A-Za-z0-9]{48,}$").unwrap(),
                key_format_hint: "sk- followed by 48+ alphanumeric characters",
                default_model: Some("moonshot-v1-8k"),
                models: &["moonshot-v1-8k", "moonshot-v1-32k", "moonshot-v1-128k"],
                bot_scoped: false,
            },
            ProviderProfile {
                id: "zhipu",
                name: "Zhipu AI",
                host: "open.bigmodel.cn",
                key_format: Regex::new(r"^[A-Za-z0-9]{32,}$").unwrap(),
                key_format_hint: "32+ alphanumeric characters",
                default_model: Some("glm-4"),
                models: &["glm-4", "glm-3-turbo"],
                bot_scoped: false,
            },
            ProviderProfile {
                id: "volcengine",
                name: "Volcengine Ark",
                host: "volces.com",
                key_format: Regex::new(r"^[A-Za-z0-9-]{20,}$").unwrap(),
                key_format_hint: "20+ characters",
                // The "model" for bot endpoints is a caller-supplied bot id,
                // so there is no meaningful default.
                default_model: None,
                models: &[],
                bot_scoped: true,
            },
        ]
    })
}

/// Find the first profile whose hostname needle appears in the URL's host.
/// Unknown hosts return `None` and get generic OpenAI-compatible behavior.
pub fn detect_provider(base_url: &str) -> Option<&'static ProviderProfile> {
    let host = match reqwest::Url::parse(base_url) {
        Ok(url) => url.host_str().map(|h| h.to_ascii_lowercase()),
        Err(_) => None,
    };
    let haystack = host.unwrap_or_else(|| base_url.to_ascii_lowercase());
    providers().iter().find(|p| haystack.contains(p.host))
}

/// Default model for a base URL: the matched provider's first catalog entry,
/// else the global fallback.
pub fn default_model_for(base_url: &str) -> &'static str {
    detect_provider(base_url)
        .and_then(|p| p.default_model)
        .unwrap_or(FALLBACK_MODEL)
}
