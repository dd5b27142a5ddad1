//! Single-consumer drain of a provider log source into a shared buffer.
//!
//! Provider log sources can only be traversed once. The pump is their sole
//! reader: it is started lazily by the first caller that needs output, appends
//! every chunk to the [`LogBuffer`] and wakes all registered waiters. Matching
//! is left to the waiters, so the pump never looks at the text it moves.

use std::sync::{Mutex, MutexGuard};

use futures::stream::{BoxStream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::ProcessError;
use crate::process::buffer::{LogBuffer, LogChunk, PumpState};
use crate::process::waiters::{PumpEvent, Waiter, WaiterRegistry};
use crate::trace;

/// A provider's single-traversal output source.
pub type LogStream = BoxStream<'static, anyhow::Result<LogChunk>>;

/// Lazily started background task feeding a [`LogBuffer`].
#[derive(Debug, Default)]
pub struct LogPump {
    buffer: LogBuffer,
    waiters: WaiterRegistry,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogPump {
    /// Create a pump that has not started yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Start draining the source produced by `open`.
    ///
    /// Only the first call opens the source and spawns the drain task; later
    /// calls return false without invoking `open`. Must be called from within
    /// a Tokio runtime.
    pub fn start<F>(&self, open: F) -> bool
    where
        F: FnOnce() -> LogStream,
    {
        let mut task = self.task();
        if !self.buffer.mark_running() {
            return false;
        }
        trace::debug!("starting log pump");
        let stream = open();
        *task = Some(tokio::spawn(drain(
            stream,
            self.buffer.clone(),
            self.waiters.clone(),
        )));
        true
    }

    /// Check if `start` has been called.
    pub fn is_started(&self) -> bool {
        !matches!(self.buffer.state(), PumpState::NotStarted)
    }

    /// The buffer this pump writes into.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Current pump state.
    pub fn state(&self) -> PumpState {
        self.buffer.state()
    }

    /// Register for the next pump event.
    pub fn subscribe(&self) -> Waiter {
        self.waiters.register()
    }

    /// Number of callers currently blocked on the pump.
    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }
}

impl Drop for LogPump {
    fn drop(&mut self) {
        if let Some(task) = self.task().take() {
            task.abort();
        }
    }
}

async fn drain(mut stream: LogStream, buffer: LogBuffer, waiters: WaiterRegistry) {
    let mut chunks = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if chunk.data.is_empty() {
                    continue;
                }
                chunks += 1;
                trace::trace!(stream = %chunk.stream, bytes = chunk.data.len(), "log chunk");
                // append lands before anyone is woken
                buffer.append(&chunk);
                waiters.notify_all(PumpEvent::Appended);
            }
            Err(err) => {
                let err = ProcessError::from_backend(err);
                trace::warn!(error = %err, chunks, "log source failed");
                buffer.finish(PumpState::Errored(err.clone()));
                waiters.notify_all(PumpEvent::Errored(err));
                return;
            }
        }
    }
    trace::debug!(chunks, bytes = buffer.len(), "log source finished");
    buffer.finish(PumpState::Done);
    waiters.notify_all(PumpEvent::Done);
}
