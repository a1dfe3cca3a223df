use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// One normalized generation request. Immutable once constructed; exactly one
/// session is driven per instance.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    /// Model hint; the provider default applies when absent.
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
    /// Cap on generated tokens; the configured default applies when absent.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_n")]
    pub n: u32,
    /// Accepted for wire compatibility; the gateway always streams.
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Caller-supplied key. When present it is used verbatim and the session
    /// is exempt from quota recording.
    #[serde(default, rename = "api_key")]
    pub credential: Option<String>,
    /// Caller-supplied upstream override; the configured base URL applies
    /// when absent.
    #[serde(default, rename = "api_base")]
    pub base_url: Option<String>,
    /// Set by the caller-identity layer for callers exempt from quota
    /// recording. Sessions on a caller-supplied key are always exempt.
    #[serde(default)]
    pub quota_exempt: bool,
}

impl GenerationRequest {
    /// All message content concatenated, for input-token estimation.
    pub fn input_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            out.push_str(&message.content);
        }
        out
    }
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

fn default_n() -> u32 {
    1
}

fn default_stream() -> bool {
    true
}
