//! Pipeline composition: scope filter in front of a batching exporter.
//!
//! ```text
//! source -> CompositeProcessor -> FilterProcessor
//!        -> CompositeProcessor -> BatchExportProcessor -> sink
//! ```

use std::sync::Arc;

use scopegate_types::LogEvent;

use crate::batch::{BatchExportProcessor, BatchStats};
use crate::composite::CompositeProcessor;
use crate::config::{BatchConfig, FilterConfig, PipelineConfig};
use crate::error::{ConfigError, PipelineError};
use crate::filter::{FilterProcessor, FilterStats, ScopeFilter};
use crate::processor::LogProcessor;
use crate::sink::{ConsoleFormat, ConsoleSink, LogSink};

/// Combined counters of every stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub filter: FilterStats,
    pub batch: BatchStats,
}

/// A built pipeline.
///
/// Events enter through [`Pipeline::processor`] (or [`Pipeline::emit`]);
/// [`Pipeline::shutdown`] drains everything still buffered before returning.
pub struct Pipeline {
    root: Arc<CompositeProcessor>,
    filter: Arc<FilterProcessor>,
    batch: Arc<BatchExportProcessor>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Entry point for event sources
    pub fn processor(&self) -> Arc<dyn LogProcessor> {
        self.root.clone()
    }

    /// Feed one event into the pipeline
    pub fn emit(&self, event: LogEvent) {
        self.root.on_event(event);
    }

    /// Export everything buffered so far
    pub async fn flush(&self) -> Result<(), PipelineError> {
        self.root.force_flush().await
    }

    /// Stop accepting events and export everything buffered
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        tracing::info!("shutting down pipeline");
        let result = self.root.shutdown().await;
        let stats = self.stats();
        tracing::info!(
            kept = stats.filter.kept,
            filtered = stats.filter.dropped,
            exported = stats.batch.exported,
            dropped = stats.batch.dropped,
            "pipeline stopped"
        );
        result
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            filter: self.filter.stats(),
            batch: self.batch.stats(),
        }
    }

    pub fn filter(&self) -> &ScopeFilter {
        self.filter.filter()
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    sink: Option<Arc<dyn LogSink>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn batch(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    /// Sink for exported batches (console text on stdout if not set)
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and wire the stages.
    ///
    /// Spawns the export worker, so it must run inside a tokio runtime.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        self.config.validate()?;

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(ConsoleSink::stdout(ConsoleFormat::Text)));
        let batch = Arc::new(BatchExportProcessor::new(sink, self.config.batch.clone()));
        let filter = Arc::new(FilterProcessor::new(
            ScopeFilter::from_config(&self.config.filter),
            CompositeProcessor::default().add(batch.clone()),
        ));
        let root = Arc::new(CompositeProcessor::default().add(filter.clone()));

        tracing::debug!(
            key = %self.config.filter.key,
            drop_value = self.config.filter.drop_value,
            scheduled_delay_ms = self.config.batch.scheduled_delay_ms,
            "pipeline built"
        );

        Ok(Pipeline {
            root,
            filter,
            batch,
        })
    }
}
