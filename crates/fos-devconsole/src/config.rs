//! Console configuration

use serde::Deserialize;

use crate::store::DEFAULT_MAX_LOGS;

/// Default delay before a mocked XHR settles, in milliseconds
pub const DEFAULT_MOCK_DELAY_MS: u64 = 10;

/// Default length of captured text response previews, in characters
pub const DEFAULT_PREVIEW_LEN: usize = 500;

/// Console configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleConfig {
    /// Log buffer capacity
    pub max_logs: usize,
    /// Delay for mocked XHRs whose rule sets none
    pub mock_delay_ms: u64,
    /// Truncation length for non-JSON response bodies
    pub preview_len: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            mock_delay_ms: DEFAULT_MOCK_DELAY_MS,
            preview_len: DEFAULT_PREVIEW_LEN,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid console config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConsoleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = max_logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.max_logs, 300);
        assert_eq!(config.mock_delay_ms, 10);
        assert_eq!(config.preview_len, 500);
    }

    #[test]
    fn test_partial_json() {
        let config = ConsoleConfig::from_json(r#"{"maxLogs": 50}"#).unwrap();
        assert_eq!(config.max_logs, 50);
        assert_eq!(config.preview_len, DEFAULT_PREVIEW_LEN);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ConsoleConfig::from_json("{maxLogs"),
            Err(ConfigError::Parse(_))
        ));
    }
}
