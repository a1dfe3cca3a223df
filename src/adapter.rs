use crate::registry;
use crate::request::GenerationRequest;
use serde_json::{Value, json};

/// Fixed client identifier sent with every upstream request.
pub const CLIENT_USER_AGENT: &str = concat!("streamgate/", env!("CARGO_PKG_VERSION"));

/// Provider families the gateway knows how to talk to. One adapter is
/// selected per request; adapters hold no per-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    /// Plain `{base}/chat/completions` upstreams.
    OpenAiCompatible,
    /// Upstreams whose endpoint path embeds a bot id in place of a model.
    BotScoped,
}

#[derive(Debug, Clone, Copy)]
pub struct Adapter {
    pub kind: AdapterKind,
    /// Display name of the matched provider, for diagnostics.
    pub provider: &'static str,
}

/// Pick the adapter for a base URL: the bot-scoped one for bot-scoped
/// providers (or any base URL routed at a `/bots` path), the generic
/// OpenAI-compatible one for everything else.
pub fn select_adapter(base_url: &str) -> Adapter {
    if let Some(profile) = registry::detect_provider(base_url) {
        let kind = if profile.bot_scoped {
            AdapterKind::BotScoped
        } else {
            AdapterKind::OpenAiCompatible
        };
        return Adapter {
            kind,
            provider: profile.name,
        };
    }
    if base_url.to_ascii_lowercase().contains("/bots") {
        return Adapter {
            kind: AdapterKind::BotScoped,
            provider: "Custom",
        };
    }
    Adapter {
        kind: AdapterKind::OpenAiCompatible,
        provider: "Custom",
    }
}

impl Adapter {
    /// Deterministically construct the upstream URL. Trailing slashes on the
    /// base are normalized away before any rule applies.
    pub fn build_endpoint(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self.kind {
            AdapterKind::OpenAiCompatible => format!("{base}/chat/completions"),
            AdapterKind::BotScoped => {
                if base.ends_with("/bots") {
                    format!("{base}/{model}/chat/completions")
                } else if base.contains("/bots/") {
                    format!("{base}{model}/chat/completions")
                } else {
                    format!("{base}/bots/{model}/chat/completions")
                }
            }
        }
    }

    pub fn build_headers(&self, credential: &str) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {credential}")),
            ("Content-Type", "application/json".to_string()),
            ("User-Agent", CLIENT_USER_AGENT.to_string()),
        ]
    }

    /// Shape the outbound body. The credential and base-URL override never
    /// reach the wire; bot-scoped upstreams also drop `model` because it is
    /// already embedded in the endpoint path.
    pub fn transform_payload(
        &self,
        req: &GenerationRequest,
        model: &str,
        max_tokens: u32,
    ) -> Value {
        let mut body = json!({
            "messages": req.messages,
            "temperature": req.temperature,
            "top_p": req.top_p,
            "frequency_penalty": req.frequency_penalty,
            "presence_penalty": req.presence_penalty,
            "max_tokens": req.max_tokens.unwrap_or(max_tokens),
            "stream": true,
            "n": req.n,
        });
        if self.kind == AdapterKind::OpenAiCompatible {
            body["model"] = Value::String(model.to_string());
        }
        body
    }

    /// Incremental text fragment carried by one parsed stream event. Events
    /// without a content delta yield the empty string.
    pub fn extract_delta(&self, event: &Value) -> String {
        match self.kind {
            AdapterKind::OpenAiCompatible | AdapterKind::BotScoped => event
                .get("choices")
                .and_then(|v| v.get(0))
                .and_then(|v| v.get("delta"))
                .and_then(|v| v.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARK_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3/bots";
    const BOT: &str = "bot-20240101000000-abcde";

    fn bot_adapter() -> Adapter {
        Adapter {
            kind: AdapterKind::BotScoped,
            provider: "Volcengine Ark",
        }
    }

    fn generic_adapter() -> Adapter {
        Adapter {
            kind: AdapterKind::OpenAiCompatible,
            provider: "Custom",
        }
    }

    fn request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "api_key": "sk-secret",
            "api_base": "https://example.com/v1"
        }))
        .unwrap()
    }

    #[test]
    fn selects_bot_scoped_adapter_for_ark_hosts() {
        assert_eq!(select_adapter(ARK_BASE).kind, AdapterKind::BotScoped);
        assert_eq!(
            select_adapter("https://api.openai.com/v1").kind,
            AdapterKind::OpenAiCompatible
        );
        assert_eq!(
            select_adapter("https://llm.internal.example.com/v1").kind,
            AdapterKind::OpenAiCompatible
        );
    }

    #[test]
    fn bots_path_on_unknown_host_selects_bot_scoped_adapter() {
        assert_eq!(
            select_adapter("https://ark.example.com/api/v3/bots/").kind,
            AdapterKind::BotScoped
        );
    }

    #[test]
    fn bot_endpoint_appends_after_bots_segment() {
        assert_eq!(
            bot_adapter().build_endpoint(ARK_BASE, BOT),
            format!("{ARK_BASE}/{BOT}/chat/completions")
        );
    }

    #[test]
    fn bot_endpoint_trailing_slash_is_normalized() {
        assert_eq!(
            bot_adapter().build_endpoint("https://ark.example.com/api/v3/bots/", BOT),
            format!("https://ark.example.com/api/v3/bots/{BOT}/chat/completions")
        );
    }

    #[test]
    fn bot_endpoint_mid_path_bots_appends_directly() {
        assert_eq!(
            bot_adapter().build_endpoint("https://ark.example.com/api/v3/bots/extra", BOT),
            format!("https://ark.example.com/api/v3/bots/extra{BOT}/chat/completions")
        );
    }

    #[test]
    fn bot_endpoint_inserts_bots_when_absent() {
        assert_eq!(
            bot_adapter().build_endpoint("https://ark.example.com/api/v3", BOT),
            format!("https://ark.example.com/api/v3/bots/{BOT}/chat/completions")
        );
    }

    #[test]
    fn bot_endpoint_is_independent_of_trailing_slashes() {
        for (with, without) in [
            ("https://ark.example.com/api/v3/bots/", "https://ark.example.com/api/v3/bots"),
            ("https://ark.example.com/api/v3/", "https://ark.example.com/api/v3"),
        ] {
            assert_eq!(
                bot_adapter().build_endpoint(with, BOT),
                bot_adapter().build_endpoint(without, BOT)
            );
        }
    }

    #[test]
    fn generic_endpoint_appends_chat_completions() {
        assert_eq!(
            generic_adapter().build_endpoint("https://api.openai.com/v1", "gpt-4"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            generic_adapter().build_endpoint("https://api.openai.com/v1/", "gpt-4"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn headers_carry_bearer_auth_and_client_identity() {
        let headers = generic_adapter().build_headers("sk-test");
        assert!(headers.contains(&("Authorization", "Bearer sk-test".to_string())));
        assert!(headers.contains(&("Content-Type", "application/json".to_string())));
        assert!(headers.iter().any(|(k, v)| *k == "User-Agent" && v.starts_with("streamgate/")));
    }

    #[test]
    fn generic_payload_keeps_model_and_strips_credentials() {
        let body = generic_adapter().transform_payload(&request(), "gpt-4", 2000);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2000);
        assert!(body.get("api_key").is_none());
        assert!(body.get("api_base").is_none());
    }

    #[test]
    fn bot_payload_drops_model_field() {
        let body = bot_adapter().transform_payload(&request(), BOT, 2000);
        assert!(body.get("model").is_none());
        assert_eq!(body["stream"], true);
        assert!(body.get("api_key").is_none());
    }

    #[test]
    fn explicit_max_tokens_wins_over_default() {
        let mut req = request();
        req.max_tokens = Some(123);
        let body = generic_adapter().transform_payload(&req, "gpt-4", 2000);
        assert_eq!(body["max_tokens"], 123);
    }

    #[test]
    fn extract_delta_reads_first_choice_content() {
        let event = serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": "Hello"}, "finish_reason": null}]
        });
        assert_eq!(generic_adapter().extract_delta(&event), "Hello");
    }

    #[test]
    fn extract_delta_is_empty_when_content_absent() {
        let event = serde_json::json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
        });
        assert_eq!(generic_adapter().extract_delta(&event), "");
        assert_eq!(generic_adapter().extract_delta(&serde_json::json!({})), "");
    }
}
