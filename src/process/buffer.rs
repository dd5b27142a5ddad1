//! Append-only accumulation of process output.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ProcessError;

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// A piece of decoded output delivered by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// Stream the data was written to.
    pub stream: StreamKind,
    /// Decoded text.
    pub data: String,
}

impl LogChunk {
    /// Create a stdout chunk.
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stdout,
            data: data.into(),
        }
    }

    /// Create a stderr chunk.
    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stderr,
            data: data.into(),
        }
    }
}

/// Point-in-time copy of everything a process has written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    /// Accumulated stdout.
    pub stdout: String,
    /// Accumulated stderr.
    pub stderr: String,
}

impl LogSnapshot {
    /// Create a snapshot from the two streams.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Both streams joined by a newline, the text readiness patterns are matched against.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        text.push('\n');
        text.push_str(&self.stderr);
        text
    }

    /// Check if nothing has been written to either stream.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// Lifecycle of the background task draining a log source.
#[derive(Debug, Clone, Default)]
pub enum PumpState {
    /// No caller has asked for logs yet.
    #[default]
    NotStarted,
    /// The source is being drained.
    Running,
    /// The source ended normally.
    Done,
    /// The source failed; the error is replayed to every later caller.
    Errored(ProcessError),
}

impl PumpState {
    /// Check if the pump has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PumpState::Done | PumpState::Errored(_))
    }

    /// Check if the pump ended normally.
    pub fn is_done(&self) -> bool {
        matches!(self, PumpState::Done)
    }
}

#[derive(Debug, Default)]
struct BufferInner {
    snapshot: LogSnapshot,
    state: PumpState,
}

/// Shared, append-only log buffer.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

impl LogBuffer {
    /// Create an empty buffer in the `NotStarted` state.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Append a chunk to its stream.
    ///
    /// Chunks arriving after the pump reached a terminal state are dropped so
    /// that terminal text stays stable.
    pub fn append(&self, chunk: &LogChunk) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        match chunk.stream {
            StreamKind::Stdout => inner.snapshot.stdout.push_str(&chunk.data),
            StreamKind::Stderr => inner.snapshot.stderr.push_str(&chunk.data),
        }
        true
    }

    /// Move from `NotStarted` to `Running`. Returns false if already started.
    pub fn mark_running(&self) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, PumpState::NotStarted) {
            inner.state = PumpState::Running;
            true
        } else {
            false
        }
    }

    /// Move to a terminal state. Returns false if a terminal state was already set.
    pub fn finish(&self, state: PumpState) -> bool {
        debug_assert!(state.is_terminal());
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = state;
        true
    }

    /// Copy of the text accumulated so far.
    pub fn snapshot(&self) -> LogSnapshot {
        self.lock().snapshot.clone()
    }

    /// Current pump state.
    pub fn state(&self) -> PumpState {
        self.lock().state.clone()
    }

    /// Text and state read under one lock, so a terminal state always
    /// accompanies the final text.
    pub fn view(&self) -> (LogSnapshot, PumpState) {
        let inner = self.lock();
        (inner.snapshot.clone(), inner.state.clone())
    }

    /// Total bytes accumulated across both streams.
    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.snapshot.stdout.len() + inner.snapshot.stderr.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
