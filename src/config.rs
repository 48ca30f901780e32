//! Configuration management for Cadence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CadenceError, Result};
use crate::ratelimit::CategoryConfig;

/// Prefix for environment overrides, e.g. `CADENCE__LIMITER__CLEANUP_INTERVAL_SECS`.
pub const ENV_PREFIX: &str = "CADENCE";

/// Main configuration for Cadence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `cadence=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds between cleanup passes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Categories to add or override on top of the built-ins
    #[serde(default)]
    pub categories: HashMap<String, CategoryConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            categories: HashMap::new(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    300
}

impl LimiterConfig {
    /// The cleanup interval as a [`Duration`].
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl CadenceConfig {
    /// Load configuration from an optional YAML file, then environment overrides.
    ///
    /// Environment variables override scalar settings only. Category names are
    /// case-sensitive, and `config` lowercases map keys, so the category table
    /// is always taken verbatim from the file.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let categories = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_yaml::from_str::<CadenceConfig>(&contents)
                    .map_err(|e| CadenceError::Config(format!("Failed to parse {}: {}", path, e)))?
                    .limiter
                    .categories
            }
            None => HashMap::new(),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let mut loaded = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<CadenceConfig>())
            .map_err(|e| CadenceError::Config(e.to_string()))?;

        loaded.limiter.categories = categories;
        loaded.validated()
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str::<CadenceConfig>(yaml)
            .map_err(|e| CadenceError::Config(format!("Failed to parse configuration: {}", e)))?
            .validated()
    }

    fn validated(self) -> Result<Self> {
        if self.limiter.cleanup_interval_secs == 0 {
            return Err(CadenceError::Config(
                "limiter.cleanup_interval_secs must be positive".into(),
            ));
        }
        for (name, category) in &self.limiter.categories {
            category.validate(name)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CadenceConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.limiter.cleanup_interval(), Duration::from_secs(300));
        assert!(config.limiter.categories.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
logging:
  level: cadence=debug
  format: json
limiter:
  cleanup_interval_secs: 60
  categories:
    auth:
      max_requests: 5
      window_ms: 60000
      block_duration_ms: 600000
    calendar_sync:
      max_requests: 20
      window_ms: 3600000
"#;
        let config = CadenceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.limiter.cleanup_interval_secs, 60);
        assert_eq!(
            config.limiter.categories["auth"],
            CategoryConfig::new(5, 60_000).with_block(600_000)
        );
        assert_eq!(config.limiter.categories["calendar_sync"].block_duration_ms, None);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = CadenceConfig::from_yaml("{}").unwrap();
        assert_eq!(config.limiter.cleanup_interval_secs, 300);
    }

    #[test]
    fn test_invalid_category_rejected() {
        let yaml = r#"
limiter:
  categories:
    broken:
      max_requests: 0
      window_ms: 1000
"#;
        assert!(matches!(CadenceConfig::from_yaml(yaml), Err(CadenceError::Config(_))));
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let yaml = "limiter:\n  cleanup_interval_secs: 0\n";
        assert!(CadenceConfig::from_yaml(yaml).is_err());
    }

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("cadence-{}-{}.yaml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let path = write_config(
            "from-file",
            "limiter:\n  categories:\n    export:\n      max_requests: 2\n      window_ms: 1000\n",
        );

        let config = CadenceConfig::load(path.to_str()).unwrap();
        assert_eq!(config.limiter.categories["export"], CategoryConfig::new(2, 1000));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    #[serial]
    fn test_load_keeps_category_name_case() {
        let path = write_config(
            "mixed-case",
            "limiter:\n  categories:\n    calendarSync:\n      max_requests: 20\n      window_ms: 3600000\n",
        );

        let loaded = CadenceConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(loaded.limiter.categories.contains_key("calendarSync"));
        assert!(!loaded.limiter.categories.contains_key("calendarsync"));

        let parsed = CadenceConfig::from_yaml(
            "limiter:\n  categories:\n    calendarSync:\n      max_requests: 20\n      window_ms: 3600000\n",
        )
        .unwrap();
        assert_eq!(loaded.limiter.categories, parsed.limiter.categories);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let path = write_config("env-override", "limiter:\n  cleanup_interval_secs: 120\n");

        std::env::set_var("CADENCE__LIMITER__CLEANUP_INTERVAL_SECS", "60");
        let from_env = CadenceConfig::load(None);
        let from_both = CadenceConfig::load(path.to_str());
        std::env::remove_var("CADENCE__LIMITER__CLEANUP_INTERVAL_SECS");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(from_env.unwrap().limiter.cleanup_interval_secs, 60);
        assert_eq!(from_both.unwrap().limiter.cleanup_interval_secs, 60);

        let from_file = write_config("env-cleared", "limiter:\n  cleanup_interval_secs: 120\n");
        let config = CadenceConfig::load(from_file.to_str()).unwrap();
        std::fs::remove_file(&from_file).unwrap();
        assert_eq!(config.limiter.cleanup_interval_secs, 120);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_fails() {
        assert!(CadenceConfig::load(Some("/nonexistent/cadence.yaml")).is_err());
    }
}
