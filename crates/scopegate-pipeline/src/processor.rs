use futures::future::BoxFuture;
use std::sync::Arc;

use scopegate_types::LogEvent;

use crate::error::PipelineError;

/// A pipeline stage that receives every emitted event.
///
/// `on_event` is fire-and-forget and may be called concurrently from any
/// thread. Flush and shutdown complete once everything the stage holds has
/// been handed on.
pub trait LogProcessor: Send + Sync {
    /// Receive one event
    fn on_event(&self, event: LogEvent);

    /// Hand on everything buffered so far
    fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>>;

    /// Flush and stop accepting events
    fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>>;
}

impl<P: LogProcessor + ?Sized> LogProcessor for Arc<P> {
    fn on_event(&self, event: LogEvent) {
        (**self).on_event(event)
    }

    fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        (**self).force_flush()
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        (**self).shutdown()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;

    /// Processor that records what it receives and which lifecycle calls it saw
    #[derive(Clone, Default)]
    pub(crate) struct RecordingProcessor {
        pub(crate) name: &'static str,
        pub(crate) events: Arc<Mutex<Vec<LogEvent>>>,
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingProcessor {
        pub(crate) fn named(name: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                events: Arc::default(),
                calls,
            }
        }

        pub(crate) fn received(&self) -> Vec<LogEvent> {
            self.events.lock().clone()
        }
    }

    impl LogProcessor for RecordingProcessor {
        fn on_event(&self, event: LogEvent) {
            self.calls.lock().push(format!("{}:event", self.name));
            self.events.lock().push(event);
        }

        fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
            self.calls.lock().push(format!("{}:flush", self.name));
            async { Ok(()) }.boxed()
        }

        fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
            self.calls.lock().push(format!("{}:shutdown", self.name));
            async { Ok(()) }.boxed()
        }
    }
}
