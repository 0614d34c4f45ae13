//! Batching export stage
//!
//! Accepted events are staged in a bounded queue and handed to the sink by a
//! background task, either on a fixed delay or as soon as a full batch is
//! waiting. Producers only ever hold the queue lock for a push; sink writes
//! happen outside of it.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use scopegate_types::LogEvent;

use crate::config::BatchConfig;
use crate::error::{PipelineError, SinkError};
use crate::processor::LogProcessor;
use crate::sink::LogSink;

/// Queue counters of a [`BatchExportProcessor`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Events waiting for export
    pub queued: usize,
    /// Events written to the sink
    pub exported: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
}

/// Requests served by the export worker
enum Control {
    Flush(oneshot::Sender<Result<(), PipelineError>>),
}

struct StagedEvents {
    events: VecDeque<LogEvent>,
    /// Set once shutdown starts; no event is accepted afterwards
    closed: bool,
}

struct Shared {
    staged: Mutex<StagedEvents>,
    config: BatchConfig,
    sink: Arc<dyn LogSink>,
    batch_ready: Notify,
    exported: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    /// Export staged events in batches of at most `max_export_batch_size`.
    ///
    /// With `full_batches_only`, a trailing partial batch stays queued for
    /// the next timer tick. A failed write does not stop later batches; the
    /// first failure is returned.
    fn export(&self, full_batches_only: bool) -> Result<(), SinkError> {
        let max_batch = self.config.max_export_batch_size;
        let mut result = Ok(());

        loop {
            let batch: Vec<LogEvent> = {
                let mut staged = self.staged.lock();
                let available = staged.events.len();
                if available == 0 || (full_batches_only && available < max_batch) {
                    break;
                }
                let count = available.min(max_batch);
                staged.events.drain(..count).collect()
            };

            match self.sink.write(&batch) {
                Ok(()) => {
                    self.exported.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    tracing::debug!(count = batch.len(), "exported batch");
                }
                Err(e) => {
                    tracing::warn!(count = batch.len(), error = %e, "sink failed to write batch");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        result
    }
}

/// Processor that buffers events and exports them to a [`LogSink`] in batches.
///
/// Must be created inside a tokio runtime. Dropping the processor stops the
/// worker without a final export; call [`LogProcessor::shutdown`] to drain.
pub struct BatchExportProcessor {
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
    cancel: CancellationToken,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BatchExportProcessor {
    /// Create the processor and spawn its export worker
    pub fn new(sink: Arc<dyn LogSink>, config: BatchConfig) -> Self {
        let shared = Arc::new(Shared {
            staged: Mutex::new(StagedEvents {
                events: VecDeque::with_capacity(config.max_export_batch_size),
                closed: false,
            }),
            config,
            sink,
            batch_ready: Notify::new(),
            exported: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let (control, control_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), control_rx, cancel.clone()));

        Self {
            shared,
            control,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Error for a flush whose worker is no longer listening
    fn worker_unavailable(&self) -> PipelineError {
        if self.shared.staged.lock().closed {
            PipelineError::AlreadyShutdown
        } else {
            PipelineError::WorkerGone
        }
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            queued: self.shared.staged.lock().events.len(),
            exported: self.shared.exported.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(shared.config.scheduled_delay());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            Some(control) = control_rx.recv() => {
                match control {
                    Control::Flush(ack) => {
                        let result = shared.export(false).map_err(PipelineError::from);
                        let _ = ack.send(result);
                    }
                }
            }

            _ = shared.batch_ready.notified() => {
                // Errors are already logged by export
                let _ = shared.export(true);
            }

            _ = ticker.tick() => {
                let _ = shared.export(false);
            }
        }
    }

    // Flushes that raced shutdown still get their events written before the ack
    control_rx.close();
    while let Some(control) = control_rx.recv().await {
        match control {
            Control::Flush(ack) => {
                let result = shared.export(false).map_err(PipelineError::from);
                let _ = ack.send(result);
            }
        }
    }
}

impl LogProcessor for BatchExportProcessor {
    fn on_event(&self, event: LogEvent) {
        // Take the scope snapshot now, while the emitter is still inside its scopes
        event.scopes().capture();

        let mut staged = self.shared.staged.lock();
        if staged.closed {
            drop(staged);
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(event_id = event.id, "rejected event after shutdown");
            return;
        }
        if staged.events.len() >= self.shared.config.max_queue_size {
            drop(staged);
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                dropped,
                capacity = self.shared.config.max_queue_size,
                "export queue full, dropped event"
            );
            return;
        }

        staged.events.push_back(event);
        let batch_ready = staged.events.len() >= self.shared.config.max_export_batch_size;
        drop(staged);

        if batch_ready {
            self.shared.batch_ready.notify_one();
        }
    }

    fn force_flush(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        async move {
            let closed = self.shared.staged.lock().closed;
            if closed {
                return Err(PipelineError::AlreadyShutdown);
            }

            let (ack, done) = oneshot::channel();
            self.control
                .send(Control::Flush(ack))
                .map_err(|_| self.worker_unavailable())?;
            done.await.map_err(|_| self.worker_unavailable())?
        }
        .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), PipelineError>> {
        async move {
            {
                let mut staged = self.shared.staged.lock();
                if staged.closed {
                    return Err(PipelineError::AlreadyShutdown);
                }
                staged.closed = true;
            }

            self.cancel.cancel();
            let worker = self.worker.lock().take();
            if let Some(worker) = worker
                && let Err(e) = worker.await
            {
                tracing::warn!(error = %e, "export worker ended abnormally");
            }

            // Nothing can be staged any more, so this drains everything
            let result = self.shared.export(false);
            tracing::debug!(
                exported = self.shared.exported.load(Ordering::Relaxed),
                dropped = self.shared.dropped.load(Ordering::Relaxed),
                "batch export processor shut down"
            );
            result.map_err(PipelineError::from)
        }
        .boxed()
    }
}

impl Drop for BatchExportProcessor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
