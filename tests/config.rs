use streamgate::app::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS, RuntimeConfig};

// Single test so the process environment is never mutated concurrently.
#[test]
fn runtime_config_env_parsing_and_fallbacks() {
    unsafe {
        std::env::remove_var("GATEWAY_LISTEN");
        std::env::set_var("OPENAI_API_BASE", "   ");
        std::env::set_var("OPENAI_MODEL", "glm-4");
        std::env::set_var("OPENAI_API_KEY", "sk-a,sk-b");
        std::env::set_var("REQUEST_TIMEOUT", "not-a-number");
        std::env::set_var("MAX_TOKENS", "1234");
    }

    let runtime = RuntimeConfig::from_env();
    assert_eq!(runtime.listen, "0.0.0.0:8080");
    // Blank values fall back the same as unset ones.
    assert_eq!(runtime.base_url, DEFAULT_BASE_URL);
    assert_eq!(runtime.model.as_deref(), Some("glm-4"));
    assert_eq!(runtime.api_keys, "sk-a,sk-b");
    assert!(runtime.has_api_key());
    // Malformed numbers fall back to the documented default.
    assert_eq!(runtime.request_timeout_ms, DEFAULT_TIMEOUT_MS);
    assert_eq!(runtime.max_tokens, 1234);

    unsafe {
        std::env::set_var("REQUEST_TIMEOUT", "45000");
        std::env::remove_var("OPENAI_MODEL");
        std::env::remove_var("OPENAI_API_KEY");
    }
    let runtime = RuntimeConfig::from_env();
    assert_eq!(runtime.request_timeout_ms, 45_000);
    assert!(runtime.model.is_none());
    assert!(!runtime.has_api_key());

    // The startup check must tolerate any of these configurations.
    streamgate::app::check_environment(&runtime);
}
