use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};

use scopegate_types::{LogEvent, ScopeFrame};

use crate::composite::CompositeProcessor;
use crate::config::FilterConfig;
use crate::error::PipelineError;
use crate::processor::LogProcessor;

/// Outcome of evaluating one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Drop,
}

/// Predicate over scope annotations.
///
/// An event is dropped when any of its scope frames holds `key` with an
/// integer value equal to `drop_value`. Values of any other type never match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeFilter {
    key: String,
    drop_value: i64,
}

impl ScopeFilter {
    pub fn new(key: impl Into<String>, drop_value: i64) -> Self {
        Self {
            key: key.into(),
            drop_value,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.key.clone(), config.drop_value)
    }

    /// Whether this frame alone is enough to drop the event
    pub fn is_disqualifying(&self, frame: &ScopeFrame) -> bool {
        frame
            .iter()
            .any(|(key, value)| key == self.key && value.as_i64() == Some(self.drop_value))
    }

    /// Evaluate a captured frame sequence; stops at the first disqualifying frame
    pub fn evaluate(&self, frames: &[ScopeFrame]) -> FilterDecision {
        if frames.iter().any(|frame| self.is_disqualifying(frame)) {
            FilterDecision::Drop
        } else {
            FilterDecision::Keep
        }
    }

    /// Evaluate an event against its scope snapshot
    pub fn decide(&self, event: &LogEvent) -> FilterDecision {
        self.evaluate(&event.scopes().capture())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn drop_value(&self) -> i64 {
        self.drop_value
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

/// Kept/dropped counters of a [`FilterProcessor`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: u64,
    pub dropped: u64,
}

/// Processor that forwards only the events its [`ScopeFilter`] keeps.
///
/// The scope snapshot is taken before the event is handed downstream, so a
/// downstream stage that buffers the event (and with it the scope data)
/// sees exactly the frames the decision was made on.
pub struct FilterProcessor {
    filter: ScopeFilter,
    inner: CompositeProcessor,
    kept: AtomicU64,
    dropped: AtomicU64,
}

impl FilterProcessor {
    pub fn new(filter: ScopeFilter, inner: CompositeProcessor) -> Self {
        Self {
            filter,
            inner,
            kept: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn filter(&self) -> &ScopeFilter {
        &self.filter
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            kept: self.kept.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl LogProcessor for FilterProcessor {
    fn on_event(&self, event: LogEvent) {
        match self.filter.decide(&event) {
            FilterDecision::Keep => {
                self.kept.fetch_add(1, Ordering::Relaxed);
                self.inner.on_event(event);
            }
            FilterDecision::Drop => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    event_id = event.id,
                    category = %event.category,
                    key = %self.filter.key,
                    "dropped event by scope filter"
                );
            }
        }
    }

    fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        self.inner.shutdown()
    }
}
