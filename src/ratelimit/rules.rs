//! Rate limit categories and their policies.
//!
//! A category is a named policy (`auth`, `export`, ...) that caps how many
//! requests an identifier may make inside a sliding window, optionally
//! followed by a hard block once the cap is hit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CadenceError, Result};

/// Category used when the caller names none, and the fallback for unknown names.
pub const DEFAULT_CATEGORY: &str = "default";

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Policy for one rate limit category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Hard block applied after a violation, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_duration_ms: Option<u64>,
}

impl CategoryConfig {
    /// A policy without a block.
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            block_duration_ms: None,
        }
    }

    /// Add a block of `block_duration_ms` after each violation.
    pub const fn with_block(mut self, block_duration_ms: u64) -> Self {
        self.block_duration_ms = Some(block_duration_ms);
        self
    }

    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject policies that could never admit a request or never expire.
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CadenceError::Config("category name must not be empty".into()));
        }
        if self.max_requests == 0 {
            return Err(CadenceError::Config(format!(
                "category '{}': max_requests must be positive",
                name
            )));
        }
        if self.window_ms == 0 {
            return Err(CadenceError::Config(format!(
                "category '{}': window_ms must be positive",
                name
            )));
        }
        if self.block_duration_ms == Some(0) {
            return Err(CadenceError::Config(format!(
                "category '{}': block_duration_ms must be positive when set",
                name
            )));
        }
        Ok(())
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self::new(100, HOUR_MS)
    }
}

/// The categories every limiter starts with.
pub fn builtin_categories() -> HashMap<String, CategoryConfig> {
    [
        (DEFAULT_CATEGORY, CategoryConfig::new(100, HOUR_MS)),
        ("auth", CategoryConfig::new(10, MINUTE_MS).with_block(5 * MINUTE_MS)),
        ("export", CategoryConfig::new(5, HOUR_MS)),
        ("import", CategoryConfig::new(10, HOUR_MS)),
        ("dashboard", CategoryConfig::new(60, HOUR_MS)),
        ("api", CategoryConfig::new(100, HOUR_MS)),
    ]
    .into_iter()
    .map(|(name, config)| (name.to_string(), config))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let categories = builtin_categories();
        assert_eq!(categories.len(), 6);

        let auth = categories["auth"];
        assert_eq!(auth.max_requests, 10);
        assert_eq!(auth.window(), Duration::from_secs(60));
        assert_eq!(auth.block_duration_ms, Some(300_000));

        assert_eq!(categories["export"], CategoryConfig::new(5, 3_600_000));
        assert_eq!(categories["import"].max_requests, 10);
        assert_eq!(categories["dashboard"].max_requests, 60);
        assert_eq!(categories["api"].max_requests, 100);
        assert_eq!(categories[DEFAULT_CATEGORY], CategoryConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(CategoryConfig::new(0, 1000).validate("x").is_err());
        assert!(CategoryConfig::new(1, 0).validate("x").is_err());
        assert!(CategoryConfig::new(1, 1000).with_block(0).validate("x").is_err());
        assert!(CategoryConfig::new(1, 1000).validate("").is_err());
        assert!(CategoryConfig::new(1, 1000).with_block(10).validate("x").is_ok());
    }

    #[test]
    fn test_parse_category_yaml() {
        let yaml = r#"
max_requests: 3
window_ms: 1000
block_duration_ms: 5000
"#;
        let config: CategoryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config, CategoryConfig::new(3, 1000).with_block(5000));

        let config: CategoryConfig = serde_yaml::from_str("max_requests: 1\nwindow_ms: 10\n").unwrap();
        assert_eq!(config.block_duration_ms, None);
    }
}
