//! Scripted provider fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};

use sandbox_process_rs::backend::dual_stream::{ByteStream, ChildApi, ChildStatus};
use sandbox_process_rs::backend::generator::CommandApi;
use sandbox_process_rs::backend::polling::{PolledApi, PolledStatus};
use sandbox_process_rs::prelude::*;
use sandbox_process_rs::ProcessAlreadyExited;

/// Exit code reported after `kill`.
pub const KILLED_EXIT_CODE: i32 = 143;

/// What a scripted command does once its output script is exhausted.
#[derive(Debug, Clone, Copy)]
pub enum Finish {
    /// Exit with the given code, closing the output.
    Exit(i32),
    /// Keep running (output stays open) until killed.
    RunUntilKilled,
}

/// Command that emits chunks on a timed script, like a chunk-stream provider.
pub struct ScriptedCommand {
    script: Vec<(Duration, LogChunk)>,
    finish: Finish,
    exit: Arc<watch::Sender<Option<i32>>>,
    log_calls: Arc<AtomicUsize>,
}

impl ScriptedCommand {
    pub fn new(script: Vec<(Duration, LogChunk)>, finish: Finish) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            script,
            finish,
            exit: Arc::new(exit),
            log_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `tick 1`, `tick 2`, ... on stdout, one every `every`.
    pub fn ticker(count: usize, every: Duration, finish: Finish) -> Self {
        let script = (1..=count)
            .map(|i| (every, LogChunk::stdout(format!("tick {i}\n"))))
            .collect();
        Self::new(script, finish)
    }

    /// Spy on how many times the log stream was opened.
    pub fn log_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.log_calls)
    }
}

#[async_trait]
impl CommandApi for ScriptedCommand {
    fn logs(&self) -> BoxStream<'static, anyhow::Result<LogChunk>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let steps: VecDeque<_> = self.script.clone().into();
        let exit = Arc::clone(&self.exit);
        let finish = self.finish;

        stream::unfold(steps, move |mut steps| {
            let exit = Arc::clone(&exit);
            async move {
                if let Some((delay, chunk)) = steps.pop_front() {
                    tokio::time::sleep(delay).await;
                    return Some((Ok(chunk), steps));
                }
                match finish {
                    Finish::Exit(code) => {
                        exit.send_if_modified(|current| {
                            let unset = current.is_none();
                            if unset {
                                *current = Some(code);
                            }
                            unset
                        });
                    }
                    Finish::RunUntilKilled => {
                        let mut rx = exit.subscribe();
                        let _ = rx.wait_for(Option::is_some).await;
                    }
                }
                None
            }
        })
        .boxed()
    }

    async fn wait(&self) -> anyhow::Result<Option<i32>> {
        let mut rx = self.exit.subscribe();
        let code = *rx.wait_for(Option::is_some).await?;
        Ok(code)
    }

    async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
        self.exit.send_if_modified(|current| {
            let unset = current.is_none();
            if unset {
                *current = Some(KILLED_EXIT_CODE);
            }
            unset
        });
        Ok(())
    }
}

/// Child process whose byte streams are fed by the test.
pub struct ChannelChild {
    stdout: Mutex<Option<ByteStream>>,
    stderr: Mutex<Option<ByteStream>>,
    status: watch::Sender<Option<ChildStatus>>,
}

/// Test-side controls for a [`ChannelChild`].
pub struct ChildControls {
    pub stdout: mpsc::UnboundedSender<Bytes>,
    pub stderr: mpsc::UnboundedSender<Bytes>,
}

fn byte_stream(rx: mpsc::UnboundedReceiver<Bytes>) -> ByteStream {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|bytes| (Ok(bytes), rx))
    })
    .boxed()
}

impl ChannelChild {
    pub fn new() -> (Self, ChildControls) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(None);
        let child = Self {
            stdout: Mutex::new(Some(byte_stream(out_rx))),
            stderr: Mutex::new(Some(byte_stream(err_rx))),
            status,
        };
        let controls = ChildControls {
            stdout: out_tx,
            stderr: err_tx,
        };
        (child, controls)
    }

    /// Record the exit status; callers drop the stream senders separately.
    pub fn exit(&self, code: Option<i32>, success: bool) {
        self.status.send_replace(Some(ChildStatus { code, success }));
    }
}

#[async_trait]
impl ChildApi for ChannelChild {
    fn take_stdout(&self) -> Option<ByteStream> {
        self.stdout.lock().unwrap().take()
    }

    fn take_stderr(&self) -> Option<ByteStream> {
        self.stderr.lock().unwrap().take()
    }

    async fn status(&self) -> anyhow::Result<ChildStatus> {
        let mut rx = self.status.subscribe();
        let status = *rx.wait_for(Option::is_some).await?;
        status.ok_or_else(|| anyhow::anyhow!("status missing"))
    }

    async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
        // signal exits still carry 128 + signal number
        self.exit(Some(KILLED_EXIT_CODE), false);
        Ok(())
    }
}

/// Snapshot-only process whose state is set by the test.
pub struct SnapshotProcess {
    pub logs: Mutex<LogSnapshot>,
    pub status: Mutex<PolledStatus>,
    pub native_log_wait: NativeLogWait,
    pub get_logs_calls: AtomicUsize,
}

/// How the fake's server-side log wait behaves.
#[derive(Debug, Clone)]
pub enum NativeLogWait {
    Unsupported,
    Matches(String),
    AlreadyExited(Option<i32>),
}

impl SnapshotProcess {
    pub fn new(stdout: &str, stderr: &str, status: PolledStatus) -> Self {
        Self {
            logs: Mutex::new(LogSnapshot::new(stdout, stderr)),
            status: Mutex::new(status),
            native_log_wait: NativeLogWait::Unsupported,
            get_logs_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_native(mut self, native: NativeLogWait) -> Self {
        self.native_log_wait = native;
        self
    }
}

#[async_trait]
impl PolledApi for SnapshotProcess {
    async fn get_logs(&self) -> anyhow::Result<LogSnapshot> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn status(&self) -> anyhow::Result<PolledStatus> {
        Ok(*self.status.lock().unwrap())
    }

    async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
        *self.status.lock().unwrap() = PolledStatus::Exited {
            exit_code: Some(KILLED_EXIT_CODE),
        };
        Ok(())
    }

    async fn wait_for_log(
        &self,
        _pattern: &Pattern,
        _timeout: Duration,
    ) -> Option<anyhow::Result<String>> {
        match &self.native_log_wait {
            NativeLogWait::Unsupported => None,
            NativeLogWait::Matches(line) => Some(Ok(line.clone())),
            NativeLogWait::AlreadyExited(exit_code) => {
                Some(Err(anyhow::Error::new(ProcessAlreadyExited {
                    exit_code: *exit_code,
                })))
            }
        }
    }
}

/// Config with no settle delay and a short debounce window.
pub fn test_config() -> ProcessConfig {
    ProcessConfig::builder()
        .logs_settle(Duration::ZERO)
        .debounce_window(Duration::from_millis(5))
        .port_poll_interval(Duration::from_millis(20))
        .probe_timeout(Duration::from_millis(200))
        .build()
}
