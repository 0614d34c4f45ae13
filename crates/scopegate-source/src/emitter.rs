use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use scopegate_types::LogLevel;

use crate::logger::Logger;

/// Settings for [`SampleEmitter`]
#[derive(Clone, Debug)]
pub struct EmitterSettings {
    /// Pause between two events
    pub interval: Duration,
    /// Stop after this many events (run until stopped if `None`)
    pub iterations: Option<u64>,
    /// Severity of the emitted events
    pub level: LogLevel,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            iterations: None,
            level: LogLevel::Info,
        }
    }
}

/// Background task that periodically logs `"Loop {loop}"` inside a
/// `"Scope {keep}"` scope, with `keep` alternating between 0 and 1
pub struct SampleEmitter {
    /// Cancellation token for stopping the task
    cancel: CancellationToken,

    /// Task handle
    task: Option<tokio::task::JoinHandle<()>>,

    /// Events emitted so far
    emitted: Arc<AtomicU64>,
}

impl SampleEmitter {
    /// Spawn the emitter on the current tokio runtime
    pub fn start(logger: Logger, settings: EmitterSettings) -> Self {
        let cancel = CancellationToken::new();
        let emitted = Arc::new(AtomicU64::new(0));

        let task = {
            let cancel = cancel.clone();
            let emitted = Arc::clone(&emitted);

            tokio::spawn(async move {
                let mut iteration: i64 = 0;

                while !cancel.is_cancelled() {
                    {
                        let _scope = logger.begin_scope("Scope {keep}", [iteration % 2]);
                        logger.log(settings.level, "Loop {loop}", [iteration]);
                    }
                    iteration += 1;
                    let count = emitted.fetch_add(1, Ordering::Relaxed) + 1;

                    if settings.iterations.is_some_and(|limit| count >= limit) {
                        tracing::debug!(count, "sample emitter reached iteration limit");
                        break;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(settings.interval) => {}
                    }
                }
            })
        };

        Self {
            cancel,
            task: Some(task),
            emitted,
        }
    }

    /// Number of events emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Check if the task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait until the task ends. Safe to cancel and call again.
    pub async fn finished(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let result = task.await;
        self.task = None;
        if let Err(e) = result {
            tracing::warn!(error = %e, "sample emitter ended abnormally");
        }
    }

    /// Stop the task and wait for it; returns the number of events emitted
    pub async fn stop(&mut self) -> u64 {
        self.cancel.cancel();
        self.finished().await;
        self.emitted()
    }
}

impl Drop for SampleEmitter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegate_pipeline::{BatchConfig, InMemorySink, Pipeline, ScopeValue};

    fn pipeline(sink: &InMemorySink) -> Pipeline {
        Pipeline::builder()
            .batch(BatchConfig {
                scheduled_delay_ms: 10,
                ..Default::default()
            })
            .sink(Arc::new(sink.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_iteration_limit_alternates_keep() {
        let sink = InMemorySink::new();
        let pipeline = pipeline(&sink);
        let logger = Logger::new("HostedService", pipeline.processor());

        let mut emitter = SampleEmitter::start(
            logger,
            EmitterSettings {
                interval: Duration::from_millis(1),
                iterations: Some(4),
                level: LogLevel::Info,
            },
        );
        emitter.finished().await;
        assert_eq!(emitter.emitted(), 4);
        assert!(!emitter.is_running());

        pipeline.shutdown().await.unwrap();
        let exported = sink.events();
        let bodies: Vec<&str> = exported.iter().map(|e| e.body()).collect();
        assert_eq!(bodies, vec!["Loop 1", "Loop 3"]);
        for event in &exported {
            let frames = event.scopes().capture();
            assert_eq!(frames[0].get("keep"), Some(&ScopeValue::Int(1)));
        }
    }

    #[tokio::test]
    async fn test_stop_cancels_long_sleep() {
        let sink = InMemorySink::new();
        let pipeline = pipeline(&sink);
        let logger = Logger::new("HostedService", pipeline.processor());

        let mut emitter = SampleEmitter::start(
            logger,
            EmitterSettings {
                interval: Duration::from_secs(3_600),
                ..Default::default()
            },
        );

        // Let the first iteration run
        while emitter.emitted() == 0 {
            tokio::task::yield_now().await;
        }
        let emitted = tokio::time::timeout(Duration::from_secs(5), emitter.stop())
            .await
            .expect("stop should not wait for the sleep to finish");
        assert_eq!(emitted, 1);

        pipeline.shutdown().await.unwrap();
        // The only event had keep = 0
        assert!(sink.is_empty());
        assert_eq!(pipeline.stats().filter.dropped, 1);
    }
}
