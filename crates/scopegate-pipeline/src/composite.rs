use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;

use scopegate_types::LogEvent;

use crate::error::PipelineError;
use crate::processor::LogProcessor;

/// Ordered list of processors that all receive every event.
///
/// Flush and shutdown visit the processors in registration order, waiting
/// for each before moving to the next. A failing processor does not stop
/// the rest; the first error is returned once all have been visited.
#[derive(Clone, Default)]
pub struct CompositeProcessor {
    processors: Vec<Arc<dyn LogProcessor>>,
}

impl CompositeProcessor {
    pub fn new(processors: Vec<Arc<dyn LogProcessor>>) -> Self {
        Self { processors }
    }

    /// Append a processor
    pub fn add(mut self, processor: Arc<dyn LogProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

}

impl LogProcessor for CompositeProcessor {
    fn on_event(&self, event: LogEvent) {
        let Some((last, rest)) = self.processors.split_last() else {
            return;
        };
        for processor in rest {
            processor.on_event(event.clone());
        }
        last.on_event(event);
    }

    fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        async move {
            let mut first_error = None;
            for processor in &self.processors {
                if let Err(e) = processor.force_flush().await {
                    tracing::warn!(error = %e, "processor flush failed");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
        .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        async move {
            let mut first_error = None;
            for processor in &self.processors {
                if let Err(e) = processor.shutdown().await {
                    tracing::warn!(error = %e, "processor shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
        .boxed()
    }
}
