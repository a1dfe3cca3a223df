use crate::error::GatewayError;
use crate::registry;
use rand::Rng;

/// Minimum credential length accepted for providers the registry does not
/// recognize.
const MIN_UNKNOWN_KEY_LEN: usize = 10;

/// Strategy for picking one key out of a configured pool. The default is a
/// uniform random pick; keeping this behind a trait lets round-robin or
/// weighted selection slot in without touching call sites.
pub trait KeyRotation: Send + Sync {
    fn pick<'a>(&self, keys: &[&'a str]) -> &'a str;
}

pub struct RandomRotation;

impl KeyRotation for RandomRotation {
    fn pick<'a>(&self, keys: &[&'a str]) -> &'a str {
        keys[rand::thread_rng().gen_range(0..keys.len())]
    }
}

/// Effective credential for a request, in priority order: the request's
/// explicit key, else one of the comma-separated configured keys, else empty.
pub fn resolve_credential(
    explicit: Option<&str>,
    configured: &str,
    rotation: &dyn KeyRotation,
) -> String {
    if let Some(key) = explicit {
        let key = key.trim();
        if !key.is_empty() {
            return key.to_string();
        }
    }
    let keys: Vec<&str> = configured
        .split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return String::new();
    }
    rotation.pick(&keys).to_string()
}

/// Check `credential` against the format of the provider matched by
/// `base_url`. Unknown providers only require non-trivial content. Runs
/// before any network I/O; failures are request-terminal.
pub fn validate_credential(credential: &str, base_url: &str) -> Result<(), GatewayError> {
    if credential.is_empty() {
        return Err(GatewayError::MissingCredential);
    }
    match registry::detect_provider(base_url) {
        Some(profile) => {
            if profile.key_format.is_match(credential) {
                Ok(())
            } else {
                Err(GatewayError::InvalidCredentialFormat {
                    provider: profile.name.to_string(),
                })
            }
        }
        None => {
            if credential.len() >= MIN_UNKNOWN_KEY_LEN {
                Ok(())
            } else {
                Err(GatewayError::InvalidCredentialFormat {
                    provider: "custom".to_string(),
                })
            }
        }
    }
}

/// Render a key safe for diagnostics: first 8 and last 4 characters.
pub fn mask_key(key: &str) -> String {
    let key = key.trim();
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***masked***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAI_KEY: &str = "sk-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJ01";
    const OPENAI_URL: &str = "https://api.openai.com/v1";

    struct FirstKey;
    impl KeyRotation for FirstKey {
        fn pick<'a>(&self, keys: &[&'a str]) -> &'a str {
            keys[0]
        }
    }

    #[test]
    fn explicit_key_wins_over_configured_pool() {
        let got = resolve_credential(Some("sk-explicit"), "sk-a,sk-b", &FirstKey);
        assert_eq!(got, "sk-explicit");
    }

    #[test]
    fn configured_pool_is_split_and_trimmed() {
        let got = resolve_credential(None, " sk-a , sk-b ,", &FirstKey);
        assert_eq!(got, "sk-a");
    }

    #[test]
    fn random_rotation_only_returns_configured_keys() {
        for _ in 0..32 {
            let got = resolve_credential(None, "sk-a,sk-b,sk-c", &RandomRotation);
            assert!(["sk-a", "sk-b", "sk-c"].contains(&got.as_str()));
        }
    }

    #[test]
    fn nothing_configured_resolves_to_empty() {
        assert_eq!(resolve_credential(None, "", &RandomRotation), "");
        assert_eq!(resolve_credential(Some("  "), " , ", &RandomRotation), "");
    }

    #[test]
    fn empty_credential_is_always_missing() {
        assert!(matches!(
            validate_credential("", OPENAI_URL),
            Err(GatewayError::MissingCredential)
        ));
        assert!(matches!(
            validate_credential("", "https://llm.internal.example.com/v1"),
            Err(GatewayError::MissingCredential)
        ));
    }

    #[test]
    fn openai_shaped_key_passes_for_openai_host() {
        assert!(validate_credential(OPENAI_KEY, OPENAI_URL).is_ok());
    }

    #[test]
    fn wrong_shape_for_matched_provider_is_rejected() {
        assert!(matches!(
            validate_credential("sk-short", OPENAI_URL),
            Err(GatewayError::InvalidCredentialFormat { .. })
        ));
    }

    #[test]
    fn unknown_provider_only_requires_minimum_length() {
        let url = "https://llm.internal.example.com/v1";
        assert!(validate_credential("0123456789", url).is_ok());
        assert!(matches!(
            validate_credential("too-short", url),
            Err(GatewayError::InvalidCredentialFormat { .. })
        ));
    }

    #[test]
    fn mask_key_hides_the_middle() {
        assert_eq!(mask_key("sk-0123456789abcdef"), "sk-01234...cdef");
        assert_eq!(mask_key("short"), "***masked***");
    }
}
