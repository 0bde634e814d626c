use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde::Serialize;
use tracing::trace;

/// Emit at most one event every this many writes when the total is known.
pub const PROGRESS_INTERVAL: u32 = 50;

/// Reported for every write when the body length is unknown.
///
/// This is a placeholder "almost done" value, not a measurement.
pub const UNKNOWN_LENGTH_PROGRESS: f64 = 0.9;

/// Name of the event hosts emit for each [`ProgressEvent`].
pub const PROGRESS_EVENT_NAME: &str = "upload_progress";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub bytes_written: u64,
    /// `-1` when the body length is unknown.
    pub total_bytes: i64,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
}

/// The `{ "progress": f64 }` payload hosts forward to their event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressPayload {
    pub progress: f64,
}

impl ProgressEvent {
    pub fn to_payload(&self) -> ProgressPayload {
        ProgressPayload {
            progress: self.progress,
        }
    }
}

/// Receives progress events synchronously from the task writing the body.
///
/// Implementations must return quickly; the upload does not advance while
/// the sink runs.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Decides which write callbacks turn into events. One per upload call.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    data_counter: u32,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_write(&mut self, bytes_written: u64, total_bytes: i64) -> Option<ProgressEvent> {
        let progress = if total_bytes <= 0 {
            Some(UNKNOWN_LENGTH_PROGRESS)
        } else if self.data_counter == 0 {
            Some((bytes_written as f64 / total_bytes as f64).clamp(0.0, 1.0))
        } else {
            None
        };
        self.data_counter = (self.data_counter + 1) % PROGRESS_INTERVAL;

        progress.map(|progress| ProgressEvent {
            bytes_written,
            total_bytes,
            progress,
        })
    }
}

/// A sink that can be closed once the call completes, so no event is delivered
/// after the result.
pub struct ProgressGate<P> {
    sink: Arc<Mutex<Option<P>>>,
}

impl<P: ProgressSink> ProgressGate<P> {
    pub fn new(sink: P) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
        }
    }

    /// Waits for an in-flight event to finish, then drops the sink.
    pub fn close(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            sink.take();
        }
    }
}

impl<P> Clone for ProgressGate<P> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<P: ProgressSink> ProgressSink for ProgressGate<P> {
    fn on_progress(&self, event: ProgressEvent) {
        if let Ok(guard) = self.sink.lock()
            && let Some(sink) = guard.as_ref()
        {
            sink.on_progress(event);
        }
    }
}

pin_project! {
    /// Counts the bytes a body stream hands to the transport and reports throttled progress.
    pub struct ProgressCountingStream<S, P> {
        #[pin]
        inner: S,
        bytes_written: u64,
        total_bytes: i64,
        throttle: ProgressThrottle,
        sink: P,
    }
}

impl<S, P> ProgressCountingStream<S, P> {
    /// `total_bytes` is the declared body length, `None` when unknown.
    pub fn new(inner: S, total_bytes: Option<u64>, sink: P) -> Self {
        Self {
            inner,
            bytes_written: 0,
            total_bytes: total_bytes
                .and_then(|total| i64::try_from(total).ok())
                .unwrap_or(-1),
            throttle: ProgressThrottle::new(),
            sink,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn total_bytes(&self) -> i64 {
        self.total_bytes
    }
}

impl<S, P, E> Stream for ProgressCountingStream<S, P>
where
    S: Stream<Item = Result<Bytes, E>>,
    P: ProgressSink,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.bytes_written += chunk.len() as u64;
                if let Some(event) = this.throttle.on_write(*this.bytes_written, *this.total_bytes) {
                    trace!(
                        bytes_written = event.bytes_written,
                        total_bytes = event.total_bytes,
                        progress = event.progress,
                        "upload progress"
                    );
                    this.sink.on_progress(event);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => Poll::Ready(other),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
