//! Adapter for providers that hand out separate stdout and stderr byte streams.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::backend::{ProcessBackend, RawExit};
use crate::error::{ProcessError, Result};
use crate::process::buffer::{LogChunk, StreamKind};
use crate::process::pump::LogStream;

/// Raw output bytes from one stream.
pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// Exit status as reported by a dual-stream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildStatus {
    /// Exit code; absent when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Whether the provider considers the run successful.
    pub success: bool,
}

/// Provider child process with two output streams and a status future.
#[async_trait]
pub trait ChildApi: Send + Sync + 'static {
    /// Take the stdout stream. Returns `Some` at most once.
    fn take_stdout(&self) -> Option<ByteStream>;

    /// Take the stderr stream. Returns `Some` at most once.
    fn take_stderr(&self) -> Option<ByteStream>;

    /// Wait for the process to exit.
    async fn status(&self) -> anyhow::Result<ChildStatus>;

    /// Send a signal to the process.
    async fn kill(&self, signal: &str) -> anyhow::Result<()>;
}

/// [`ProcessBackend`] over a [`ChildApi`].
pub struct DualStreamBackend<C> {
    child: Arc<C>,
}

impl<C: ChildApi> DualStreamBackend<C> {
    /// Wrap a provider child process.
    pub fn new(child: C) -> Self {
        Self {
            child: Arc::new(child),
        }
    }

    /// The wrapped child.
    pub fn child(&self) -> &Arc<C> {
        &self.child
    }
}

#[async_trait]
impl<C: ChildApi> ProcessBackend for DualStreamBackend<C> {
    fn open_logs(&self) -> LogStream {
        let stdout = self
            .child
            .take_stdout()
            .map(|s| decode_stream(s, StreamKind::Stdout))
            .unwrap_or_else(|| stream::empty().boxed());
        let stderr = self
            .child
            .take_stderr()
            .map(|s| decode_stream(s, StreamKind::Stderr))
            .unwrap_or_else(|| stream::empty().boxed());
        stream::select(stdout, stderr).boxed()
    }

    async fn wait(&self) -> Result<RawExit> {
        let status = self
            .child
            .status()
            .await
            .map_err(ProcessError::from_backend)?;
        Ok(RawExit {
            code: status.code,
            success: Some(status.success),
        })
    }

    async fn kill(&self, signal: &str) -> Result<()> {
        self.child
            .kill(signal)
            .await
            .map_err(ProcessError::from_backend)
    }
}

/// Turn a byte stream into text chunks tagged with `kind`.
fn decode_stream(bytes: ByteStream, kind: StreamKind) -> LogStream {
    stream::unfold(
        Some((bytes, Utf8Decoder::default())),
        move |state| async move {
            let Some((mut bytes, mut decoder)) = state else {
                return None;
            };
            loop {
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        let data = decoder.decode(&chunk);
                        if data.is_empty() {
                            continue;
                        }
                        return Some((Ok(LogChunk { stream: kind, data }), Some((bytes, decoder))));
                    }
                    Some(Err(err)) => return Some((Err(err), None)),
                    None => {
                        let data = decoder.finish();
                        if data.is_empty() {
                            return None;
                        }
                        return Some((Ok(LogChunk { stream: kind, data }), None));
                    }
                }
            }
        },
    )
    .boxed()
}

/// Incremental UTF-8 decoder.
///
/// Sequences split across chunks are held back until complete; invalid bytes
/// become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `bytes` (plus any held-back prefix) as is complete.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut pos = 0;
        while pos < self.pending.len() {
            match std::str::from_utf8(&self.pending[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = self.pending.len();
                }
                Err(err) => {
                    let valid_end = pos + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[pos..valid_end]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos = valid_end + len;
                        }
                        None => {
                            // incomplete tail: keep it for the next chunk
                            pos = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..pos);
        out
    }

    /// Flush whatever is held back, lossily.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
