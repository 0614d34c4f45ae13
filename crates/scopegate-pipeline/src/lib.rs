//! Log processing pipeline for scopegate
//!
//! This crate provides the scope filter, the batching export stage, the
//! processor composition that wires them together, and the sinks that
//! receive exported batches.

mod batch;
mod composite;
mod config;
mod error;
mod filter;
mod pipeline;
mod processor;
mod sink;

pub use batch::{BatchExportProcessor, BatchStats};
pub use composite::CompositeProcessor;
pub use config::{
    BatchConfig, DEFAULT_MAX_EXPORT_BATCH_SIZE, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_SCHEDULED_DELAY_MS, FilterConfig, PipelineConfig,
};
pub use error::{ConfigError, PipelineError, SinkError};
pub use filter::{FilterDecision, FilterProcessor, FilterStats, ScopeFilter};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStats};
pub use processor::LogProcessor;
pub use sink::{ConsoleFormat, ConsoleSink, InMemorySink, LogSink, render_json, render_text};

// Re-export types used in our public API
pub use scopegate_types::{LogEvent, LogLevel, ScopeChain, ScopeFrame, ScopeValue};
