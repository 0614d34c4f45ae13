use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Default delay between timer driven exports
pub const DEFAULT_SCHEDULED_DELAY_MS: u64 = 100;

/// Default maximum number of queued events
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;

/// Default maximum number of events per sink write
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;

/// Pipeline configuration, fixed once the pipeline is built
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub batch: BatchConfig,
}

/// Which scope annotation drops an event
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Annotation key to inspect
    pub key: String,

    /// Integer value that marks an event for dropping
    pub drop_value: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            key: "keep".to_string(),
            drop_value: 0,
        }
    }
}

/// Batching export settings
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Delay between timer driven exports, in milliseconds
    pub scheduled_delay_ms: u64,

    /// Events beyond this many queued are dropped
    pub max_queue_size: usize,

    /// Upper bound on one sink write; also the size that triggers an early export
    pub max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scheduled_delay_ms: DEFAULT_SCHEDULED_DELAY_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn scheduled_delay(&self) -> Duration {
        Duration::from_millis(self.scheduled_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduled_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "batch.scheduled_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_export_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch.max_export_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(ConfigError::Invalid {
                field: "batch.max_export_batch_size",
                reason: format!(
                    "{} exceeds max_queue_size {}",
                    self.max_export_batch_size, self.max_queue_size
                ),
            });
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "filter.key",
                reason: "must not be empty".to_string(),
            });
        }
        self.batch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.filter.key, "keep");
        assert_eq!(config.filter.drop_value, 0);
        assert_eq!(config.batch.scheduled_delay(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [batch]
            scheduled_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.scheduled_delay_ms, 250);
        assert_eq!(config.batch.max_queue_size, DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(config.filter, FilterConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [filter]
            key = "sampled"
            drop_value = -1

            [batch]
            scheduled_delay_ms = 50
            max_queue_size = 10
            max_export_batch_size = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.filter.key, "sampled");
        assert_eq!(config.filter.drop_value, -1);
        assert_eq!(config.batch.max_export_batch_size, 5);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PipelineConfig::from_toml_str("[filter]\nkeys = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let err = PipelineConfig::from_toml_str("[batch]\nscheduled_delay_ms = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "batch.scheduled_delay_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_batch_larger_than_queue_rejected() {
        let config = BatchConfig {
            max_queue_size: 4,
            max_export_batch_size: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = PipelineConfig::from_toml_str("[filter]\nkey = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "filter.key", .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::load("/nonexistent/scopegate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
