//! Delivery of progress events to whoever started a run.

use std::sync::{Arc, Mutex};

use subforge_common::{ProgressEvent, TranscriptionPhase};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receives progress events in the order they occur.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // Receiver dropped means nobody is listening any more
        let _ = self.send(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event)
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Per-run wrapper around the caller's sink.
///
/// Nothing passes once the run's token is cancelled, and the percent never
/// moves backwards within a phase.
pub(crate) struct RunSink {
    inner: Arc<dyn ProgressSink>,
    token: CancellationToken,
    last: Mutex<Option<(TranscriptionPhase, u8)>>,
}

impl RunSink {
    pub(crate) fn new(inner: Arc<dyn ProgressSink>, token: CancellationToken) -> Self {
        Self {
            inner,
            token,
            last: Mutex::new(None),
        }
    }

    /// Forward the run's successful terminal event, even if a cancel raced it.
    pub(crate) fn emit_final(&self, event: ProgressEvent) {
        self.inner.emit(event);
    }
}

impl ProgressSink for RunSink {
    fn emit(&self, mut event: ProgressEvent) {
        if self.token.is_cancelled() {
            return;
        }

        if let Ok(mut last) = self.last.lock() {
            if let Some((phase, percent)) = *last {
                if phase == event.phase && event.percent < percent {
                    event.percent = percent;
                }
            }
            *last = Some((event.phase, event.percent));
        }

        self.inner.emit(event);
    }
}
