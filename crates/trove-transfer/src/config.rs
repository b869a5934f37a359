use serde::{Deserialize, Serialize};

/// Retries after the first attempt; every transfer gets at most three tries.
pub const MAX_RETRY_COUNT: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Retries after the first failed attempt. No delay between attempts.
    pub max_retry_count: u32,
    /// Maximum number of JSON bodies decoded concurrently off the caller's task.
    pub decode_concurrency: usize,
    /// Per-request timeout for the HTTP transport.
    pub request_timeout_secs: u64,
}

impl TransferConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retry_count.saturating_add(1)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retry_count: MAX_RETRY_COUNT,
            decode_concurrency: 4,
            request_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = TransferConfig::default();
        assert_eq!(c.max_attempts(), 3);
        assert_eq!(c.decode_concurrency, 4);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: TransferConfig = serde_json::from_str(r#"{"max_retry_count": 0}"#).unwrap();
        assert_eq!(c.max_attempts(), 1);
        assert_eq!(c.request_timeout_secs, 60);
    }
}
