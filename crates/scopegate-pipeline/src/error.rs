//! Error types for the pipeline crate

use std::path::PathBuf;

/// Errors returned by flush and shutdown
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The sink rejected a batch
    #[error("export failed: {0}")]
    Export(#[from] SinkError),

    /// Flush or shutdown requested after shutdown already started
    #[error("processor already shut down")]
    AlreadyShutdown,

    /// The background export task stopped before answering
    #[error("export worker is not running")]
    WorkerGone,
}

/// Errors raised by a sink while writing a batch
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Any other sink specific failure
    #[error("{0}")]
    Other(String),
}

/// Errors while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_error_display() {
        let err = PipelineError::from(SinkError::Other("disk full".to_string()));
        assert_eq!(err.to_string(), "export failed: disk full");
    }

    #[test]
    fn test_invalid_config_display() {
        let err = ConfigError::Invalid {
            field: "batch.scheduled_delay_ms",
            reason: "must be greater than zero".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("scheduled_delay_ms"));
        assert!(msg.contains("greater than zero"));
    }
}
