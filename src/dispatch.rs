use crate::error::GatewayError;
use serde_json::Value;

/// Issue the single upstream POST for a session, bounded by `timeout_ms`.
/// The timeout covers the whole exchange, response body included, so a stalled
/// stream is cut off the same way a stalled connect is. Exactly one attempt is
/// made; callers never retry.
pub async fn dispatch(
    client: &reqwest::Client,
    endpoint: &str,
    headers: &[(&'static str, String)],
    body: &Value,
    timeout_ms: u64,
) -> Result<reqwest::Response, GatewayError> {
    let mut req = client
        .post(endpoint)
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .json(body);
    for (name, value) in headers {
        req = req.header(*name, value);
    }
    let resp = req.send().await.map_err(|err| {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout { timeout_ms }
        } else {
            GatewayError::Transport {
                detail: err.to_string(),
            }
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = extract_error_message(&text).unwrap_or_else(|| text.clone());
        return Err(GatewayError::UpstreamHttp {
            status,
            message,
            body: text,
        });
    }
    Ok(resp)
}

/// Pull a human-readable `error.message` out of an upstream error body.
fn extract_error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
