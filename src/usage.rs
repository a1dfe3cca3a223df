use serde::Serialize;
use uuid::Uuid;

/// Token accounting for one finished session, handed to the quota-recording
/// collaborator. Counts come from the character heuristic in `tokens`, not a
/// real tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecord {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Seam to the external quota subsystem. The gateway emits at most one record
/// per session, on the terminal transition, and never for sessions that ran
/// on a caller-supplied key.
pub trait UsageSink: Send + Sync {
    fn record(&self, session_id: Uuid, model: &str, usage: UsageRecord);
}

/// Default sink: a structured log line plus a metrics counter. Deployments
/// with real quota bookkeeping inject their own implementation.
pub struct LogUsageSink;

impl UsageSink for LogUsageSink {
    fn record(&self, session_id: Uuid, model: &str, usage: UsageRecord) {
        tracing::info!(
            session_id = %session_id,
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total_tokens,
            "session usage"
        );
        metrics::counter!("streamgate_usage_tokens_total").increment(usage.total_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_the_sum_of_input_and_output() {
        let usage = UsageRecord::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }
}
