//! Adapter for providers that only serve point-in-time log snapshots.
//!
//! Such providers have no live output push. The live log source is emulated
//! by polling snapshots and forwarding what was appended since the last poll.
//! Providers that also offer server-side readiness waits get them preferred
//! by the handle; those calls may fail with
//! [`ProcessAlreadyExited`](crate::ProcessAlreadyExited), which the handle
//! answers by re-checking buffered output.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::backend::{ProcessBackend, RawExit};
use crate::error::{ProcessError, Result};
use crate::process::buffer::{LogChunk, LogSnapshot, StreamKind};
use crate::process::matcher::Pattern;
use crate::process::pump::LogStream;

/// Whether a polled process is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolledStatus {
    /// Still running.
    Running,
    /// Exited; the code is absent if the provider did not report one.
    Exited {
        /// Reported exit code.
        exit_code: Option<i32>,
    },
}

/// Provider process reachable only through request/response calls.
#[async_trait]
pub trait PolledApi: Send + Sync + 'static {
    /// Everything the process has written so far.
    async fn get_logs(&self) -> anyhow::Result<LogSnapshot>;

    /// Current process status.
    async fn status(&self) -> anyhow::Result<PolledStatus>;

    /// Terminate the process.
    async fn kill(&self, signal: &str) -> anyhow::Result<()>;

    /// Server-side log wait, if supported.
    async fn wait_for_log(
        &self,
        _pattern: &Pattern,
        _timeout: Duration,
    ) -> Option<anyhow::Result<String>> {
        None
    }

    /// Server-side port wait, if supported.
    async fn wait_for_port(&self, _port: u16, _timeout: Duration) -> Option<anyhow::Result<()>> {
        None
    }
}

type PortRoute = Arc<dyn Fn(u16, &str) -> String + Send + Sync>;

/// [`ProcessBackend`] over a [`PolledApi`].
pub struct PollingBackend<P> {
    api: Arc<P>,
    poll_interval: Duration,
    port_route: Option<PortRoute>,
}

impl<P> fmt::Debug for PollingBackend<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingBackend")
            .field("poll_interval", &self.poll_interval)
            .field("routes_ports", &self.port_route.is_some())
            .finish()
    }
}

impl<P: PolledApi> PollingBackend<P> {
    /// Wrap a provider process, polling every `poll_interval`.
    pub fn new(api: P, poll_interval: Duration) -> Self {
        Self {
            api: Arc::new(api),
            poll_interval,
            port_route: None,
        }
    }

    /// Let client-side port probes reach the process through `route`,
    /// which maps `(port, hostname)` to a URL.
    pub fn with_port_route<F>(mut self, route: F) -> Self
    where
        F: Fn(u16, &str) -> String + Send + Sync + 'static,
    {
        self.port_route = Some(Arc::new(route));
        self
    }

    /// The wrapped provider process.
    pub fn api(&self) -> &Arc<P> {
        &self.api
    }
}

#[async_trait]
impl<P: PolledApi> ProcessBackend for PollingBackend<P> {
    fn open_logs(&self) -> LogStream {
        let state = PollState {
            api: Arc::clone(&self.api),
            interval: self.poll_interval,
            seen: SeenText::default(),
            queued: VecDeque::new(),
            polled_once: false,
            finished: false,
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(chunk) = state.queued.pop_front() {
                    return Some((Ok(chunk), state));
                }
                if state.finished {
                    return None;
                }
                if let Err(err) = state.poll().await {
                    state.finished = true;
                    return Some((Err(err), state));
                }
            }
        })
        .boxed()
    }

    async fn wait(&self) -> Result<RawExit> {
        loop {
            let status = self
                .api
                .status()
                .await
                .map_err(ProcessError::from_backend)?;
            if let PolledStatus::Exited { exit_code } = status {
                return Ok(RawExit {
                    code: exit_code,
                    success: None,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn kill(&self, signal: &str) -> Result<()> {
        self.api
            .kill(signal)
            .await
            .map_err(ProcessError::from_backend)
    }

    async fn historical_logs(&self) -> Result<Option<LogSnapshot>> {
        self.api
            .get_logs()
            .await
            .map(Some)
            .map_err(ProcessError::from_backend)
    }

    async fn wait_for_log_native(
        &self,
        pattern: &Pattern,
        timeout: Duration,
    ) -> Option<Result<String>> {
        let outcome = self.api.wait_for_log(pattern, timeout).await?;
        Some(outcome.map_err(ProcessError::from_backend))
    }

    async fn wait_for_port_native(&self, port: u16, timeout: Duration) -> Option<Result<()>> {
        let outcome = self.api.wait_for_port(port, timeout).await?;
        Some(outcome.map_err(ProcessError::from_backend))
    }

    fn port_url(&self, port: u16, hostname: &str) -> Option<String> {
        self.port_route.as_ref().map(|route| route(port, hostname))
    }
}

/// Text already forwarded, per stream.
#[derive(Debug, Default, Clone)]
struct SeenText {
    stdout: String,
    stderr: String,
}

struct PollState<P> {
    api: Arc<P>,
    interval: Duration,
    seen: SeenText,
    queued: VecDeque<LogChunk>,
    polled_once: bool,
    finished: bool,
}

impl<P: PolledApi> PollState<P> {
    async fn poll(&mut self) -> anyhow::Result<()> {
        if self.polled_once {
            tokio::time::sleep(self.interval).await;
        }
        self.polled_once = true;

        // status first, so a snapshot taken after exit is known to be final
        let status = self.api.status().await?;
        let snapshot = self.api.get_logs().await?;

        if let Some(data) = appended(&snapshot.stdout, &mut self.seen.stdout) {
            self.queued.push_back(LogChunk {
                stream: StreamKind::Stdout,
                data,
            });
        }
        if let Some(data) = appended(&snapshot.stderr, &mut self.seen.stderr) {
            self.queued.push_back(LogChunk {
                stream: StreamKind::Stderr,
                data,
            });
        }
        if matches!(status, PolledStatus::Exited { .. }) {
            self.finished = true;
        }
        Ok(())
    }
}

/// Text added to `current` since `seen` was forwarded.
///
/// A snapshot that no longer extends what was forwarded (the provider
/// truncated or rotated it, whatever its new length) is forwarded whole.
fn appended(current: &str, seen: &mut String) -> Option<String> {
    match current.strip_prefix(seen.as_str()) {
        Some("") => None,
        Some(fresh) => {
            let fresh = fresh.to_string();
            seen.push_str(&fresh);
            Some(fresh)
        }
        None => {
            seen.clear();
            seen.push_str(current);
            (!current.is_empty()).then(|| current.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::ProcessAlreadyExited;

    #[derive(Default)]
    struct Scripted {
        // each poll pops one (status, stdout, stderr) frame; the last one sticks
        frames: Mutex<VecDeque<(PolledStatus, &'static str, &'static str)>>,
        current: Mutex<Option<(PolledStatus, &'static str, &'static str)>>,
        native_exited: bool,
    }

    impl Scripted {
        fn with_frames(frames: Vec<(PolledStatus, &'static str, &'static str)>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
                ..Default::default()
            }
        }

        fn advance(&self) -> (PolledStatus, &'static str, &'static str) {
            let mut current = self.current.lock().unwrap();
            if let Some(next) = self.frames.lock().unwrap().pop_front() {
                *current = Some(next);
            }
            (*current).unwrap_or((PolledStatus::Running, "", ""))
        }

        fn peek(&self) -> (PolledStatus, &'static str, &'static str) {
            let current = self.current.lock().unwrap();
            (*current).unwrap_or((PolledStatus::Running, "", ""))
        }
    }

    #[async_trait]
    impl PolledApi for Scripted {
        async fn get_logs(&self) -> anyhow::Result<LogSnapshot> {
            let (_, out, err) = self.peek();
            Ok(LogSnapshot::new(out, err))
        }

        async fn status(&self) -> anyhow::Result<PolledStatus> {
            Ok(self.advance().0)
        }

        async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn wait_for_log(
            &self,
            _pattern: &Pattern,
            _timeout: Duration,
        ) -> Option<anyhow::Result<String>> {
            self.native_exited.then(|| {
                Err(anyhow::Error::new(ProcessAlreadyExited {
                    exit_code: Some(2),
                }))
            })
        }
    }

    #[test]
    fn test_appended_forwards_only_new_text() {
        let mut seen = String::new();
        assert_eq!(appended("a\n", &mut seen).as_deref(), Some("a\n"));
        assert_eq!(appended("a\n", &mut seen), None);
        assert_eq!(appended("a\nb\n", &mut seen).as_deref(), Some("b\n"));
        assert_eq!(seen, "a\nb\n");
    }

    #[test]
    fn test_appended_forwards_rotated_snapshots_whole() {
        let mut seen = String::new();
        appended("a\nb\n", &mut seen);

        // shorter
        assert_eq!(appended("c\n", &mut seen).as_deref(), Some("c\n"));
        // same length, different text
        assert_eq!(appended("d\n", &mut seen).as_deref(), Some("d\n"));
        // longer, but not an extension
        assert_eq!(
            appended("x\ny\nz\n", &mut seen).as_deref(),
            Some("x\ny\nz\n")
        );
        // multi-byte text where the old length is not a char boundary
        assert_eq!(appended("é\n", &mut seen).as_deref(), Some("é\n"));
        assert_eq!(appended("é\nok\n", &mut seen).as_deref(), Some("ok\n"));
        // emptied
        assert_eq!(appended("", &mut seen), None);
        assert_eq!(seen, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_stream_emits_deltas_until_exit() {
        let backend = PollingBackend::new(
            Scripted::with_frames(vec![
                (PolledStatus::Running, "tick 1\n", ""),
                (PolledStatus::Running, "tick 1\n", "warn\n"),
                (PolledStatus::Running, "tick 1\ntick 2\n", "warn\n"),
                (PolledStatus::Exited { exit_code: Some(0) }, "tick 1\ntick 2\nbye\n", "warn\n"),
            ]),
            Duration::from_millis(50),
        );

        let chunks: Vec<LogChunk> = backend
            .open_logs()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![
                LogChunk::stdout("tick 1\n"),
                LogChunk::stderr("warn\n"),
                LogChunk::stdout("tick 2\n"),
                LogChunk::stdout("bye\n"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_status() {
        let backend = PollingBackend::new(
            Scripted::with_frames(vec![
                (PolledStatus::Running, "", ""),
                (PolledStatus::Exited { exit_code: None }, "", ""),
            ]),
            Duration::from_millis(50),
        );
        let raw = backend.wait().await.unwrap();
        assert_eq!(raw, RawExit::unknown());
        assert!(raw.normalize(backend.exit_contract()).is_err());
    }

    #[tokio::test]
    async fn test_native_already_exited_is_recognised() {
        let backend = PollingBackend::new(
            Scripted {
                native_exited: true,
                ..Default::default()
            },
            Duration::from_millis(50),
        );
        let err = backend
            .wait_for_log_native(&Pattern::from("ready"), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(backend.wait_for_port_native(80, Duration::from_secs(1)).await.is_none());
    }

    #[test]
    fn test_port_route() {
        let backend = PollingBackend::new(Scripted::default(), Duration::from_millis(50));
        assert_eq!(backend.port_url(8080, "localhost"), None);

        let backend = backend.with_port_route(|port, _| format!("https://{port}-box.example.dev"));
        assert_eq!(
            backend.port_url(8080, "localhost").as_deref(),
            Some("https://8080-box.example.dev")
        );
    }
}
