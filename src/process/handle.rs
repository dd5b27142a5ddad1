//! The caller-facing process handle.
//!
//! A [`ProcessHandle`] composes a provider backend with one [`LogPump`]. Any
//! number of tasks may call `logs`, `wait_for_log` and `wait_for_port`
//! concurrently; they all read the same buffer, and the provider's output is
//! drained exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::backend::ProcessBackend;
use crate::error::{ProcessError, Result};
use crate::process::buffer::{LogSnapshot, PumpState};
use crate::process::config::ProcessConfig;
use crate::process::matcher::{Pattern, RescanState};
use crate::process::probe::{HttpProbe, PortProber, Probe};
use crate::process::pump::LogPump;
use crate::trace;

/// Signal sent by `kill` when the caller does not name one.
pub const DEFAULT_KILL_SIGNAL: &str = "SIGTERM";

/// How a scan of the log buffer ended, short of a timeout.
enum ScanOutcome {
    Matched(LogMatch),
    Exited,
}

/// The line that satisfied a readiness pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMatch {
    /// The full matching line, without its line terminator.
    pub line: String,
}

/// Outcome of waiting for a process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// The process exit code.
    pub exit_code: i32,
}

impl ExitOutcome {
    /// Check if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for [`SandboxProcess::wait_for_port`].
#[derive(Debug, Clone, Default)]
pub struct PortOptions {
    /// Overall deadline; the handle's configured default when `None`.
    pub timeout: Option<Duration>,
    /// Hostname to probe; the handle's configured default when `None`.
    pub hostname: Option<String>,
}

impl PortOptions {
    /// Options with only a deadline set.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            hostname: None,
        }
    }

    /// Set the hostname to probe.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

/// Uniform contract over processes running in any sandbox provider.
#[async_trait]
pub trait SandboxProcess: Send + Sync {
    /// Provider-assigned process id.
    fn id(&self) -> &str;

    /// The command line the process was started with.
    fn command(&self) -> &str;

    /// Ask the provider to terminate the process (SIGTERM when `signal` is `None`).
    async fn kill(&self, signal: Option<&str>) -> Result<()>;

    /// Everything written so far, without waiting for more.
    async fn logs(&self) -> LogSnapshot;

    /// Wait for the process to exit.
    async fn wait(&self, timeout: Option<Duration>) -> Result<ExitOutcome>;

    /// Wait for a line of output matching `pattern`.
    async fn wait_for_log(&self, pattern: Pattern, timeout: Option<Duration>) -> Result<LogMatch>;

    /// Wait for `port` to accept connections.
    async fn wait_for_port(&self, port: u16, options: PortOptions) -> Result<()>;
}

/// Process handle over a provider backend.
pub struct ProcessHandle<B> {
    id: String,
    command: String,
    backend: B,
    pump: LogPump,
    probe: Arc<dyn Probe>,
    config: ProcessConfig,
}

impl<B> fmt::Debug for ProcessHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("pump", &self.pump.state())
            .finish()
    }
}

impl<B: ProcessBackend> ProcessHandle<B> {
    /// Wrap a backend process with the default configuration.
    pub fn new(id: impl Into<String>, command: impl Into<String>, backend: B) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            backend,
            pump: LogPump::new(),
            probe: Arc::new(HttpProbe::new()),
            config: ProcessConfig::default(),
        }
    }

    /// Wrap a backend process with a custom configuration.
    pub fn with_config(
        id: impl Into<String>,
        command: impl Into<String>,
        backend: B,
        config: ProcessConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut handle = Self::new(id, command, backend);
        handle.config = config;
        Ok(handle)
    }

    /// Replace the probe used by client-side port waits.
    pub fn with_probe(mut self, probe: impl Probe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Provider-assigned process id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The command line the process was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The handle's configuration.
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Current state of the log pump.
    pub fn pump_state(&self) -> PumpState {
        self.pump.state()
    }

    /// Number of callers currently blocked on new output.
    pub fn pending_waiters(&self) -> usize {
        self.pump.pending_waiters()
    }

    fn ensure_pump(&self) {
        if self.pump.start(|| self.backend.open_logs()) {
            trace::debug!(process = %self.id, "log pump started");
        }
    }

    /// Ask the provider to terminate the process.
    ///
    /// The log pump keeps draining until the provider closes the output.
    pub async fn kill(&self, signal: Option<&str>) -> Result<()> {
        let signal = signal.unwrap_or(DEFAULT_KILL_SIGNAL);
        trace::debug!(process = %self.id, signal, "killing process");
        self.backend.kill(signal).await
    }

    /// Everything written so far.
    ///
    /// Starts the log pump on first use, then yields to the scheduler (and
    /// waits `logs_settle`) so output from a process that already finished is
    /// picked up without blocking for new data.
    pub async fn logs(&self) -> LogSnapshot {
        self.ensure_pump();
        tokio::task::yield_now().await;
        if !self.config.logs_settle.is_zero() && !self.pump.state().is_terminal() {
            tokio::time::sleep(self.config.logs_settle).await;
        }
        self.pump.buffer().snapshot()
    }

    /// Wait for the process to exit and return its exit code.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ExitOutcome> {
        let timeout = timeout.unwrap_or(self.config.wait_timeout);
        let raw = tokio::time::timeout(timeout, self.backend.wait())
            .await
            .map_err(|_| ProcessError::timeout("wait", timeout))??;
        let exit_code = raw.normalize(self.backend.exit_contract())?;
        Ok(ExitOutcome { exit_code })
    }

    /// Wait for a line of output matching `pattern`.
    ///
    /// A provider-side wait is preferred when the backend has one. If it fails
    /// because the process already exited, the answer is derived from output
    /// the provider retained and from the live buffer instead.
    pub async fn wait_for_log(
        &self,
        pattern: impl Into<Pattern>,
        timeout: Option<Duration>,
    ) -> Result<LogMatch> {
        let pattern = pattern.into();
        let timeout = timeout.unwrap_or(self.config.wait_for_log_timeout);
        let deadline = Instant::now() + timeout;

        let native = tokio::time::timeout_at(
            deadline,
            self.backend.wait_for_log_native(&pattern, timeout),
        )
        .await
        .map_err(|_| ProcessError::timeout("wait_for_log", timeout))?;
        if let Some(native) = native {
            match native {
                Ok(line) => return Ok(LogMatch { line }),
                Err(ProcessError::ProcessExited { .. }) => {
                    trace::debug!(process = %self.id, %pattern, "native wait saw exit, checking buffered output");
                }
                Err(err) => return Err(err),
            }
        }

        let outcome = tokio::time::timeout_at(deadline, self.scan_for(&pattern))
            .await
            .map_err(|_| ProcessError::timeout("wait_for_log", timeout))??;
        match outcome {
            ScanOutcome::Matched(found) => Ok(found),
            // exit wins over the deadline once the output has closed
            ScanOutcome::Exited => Err(self.exited_error(deadline).await),
        }
    }

    async fn scan_for(&self, pattern: &Pattern) -> Result<ScanOutcome> {
        match self.backend.historical_logs().await {
            Ok(Some(history)) => {
                if let Some(line) = pattern.find_in(&history) {
                    trace::debug!(process = %self.id, %pattern, "matched in retained output");
                    return Ok(ScanOutcome::Matched(LogMatch { line }));
                }
            }
            Ok(None) => {}
            Err(_err) => {
                trace::warn!(process = %self.id, error = %_err, "fetching retained output failed");
            }
        }

        self.ensure_pump();
        let mut rescan = RescanState::new(self.config.debounce_window);
        loop {
            // subscribe before reading so nothing appended in between is missed
            let waiter = self.pump.subscribe();
            let (snapshot, state) = self.pump.buffer().view();
            rescan.mark_scanned(Instant::now().into_std());

            if let Some(line) = pattern.find_in(&snapshot) {
                trace::debug!(process = %self.id, %pattern, "pattern matched");
                return Ok(ScanOutcome::Matched(LogMatch { line }));
            }
            match state {
                PumpState::Done => return Ok(ScanOutcome::Exited),
                PumpState::Errored(err) => return Err(err),
                PumpState::NotStarted | PumpState::Running => {}
            }

            waiter.notified().await;
            rescan.mark_dirty();
            let delay = rescan.delay_until_rescan(Instant::now().into_std());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Build the error for a process whose output closed, looking up its
    /// exit code for at most `exit_code_grace` and never past `deadline`.
    async fn exited_error(&self, deadline: Instant) -> ProcessError {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let grace = self.config.exit_code_grace.min(remaining);
        let exit_code = match tokio::time::timeout(grace, self.backend.wait()).await {
            Ok(Ok(raw)) => raw.resolve(self.backend.exit_contract()),
            _ => None,
        };
        ProcessError::exited(exit_code)
    }

    /// Wait for `port` to accept connections.
    ///
    /// Fails fast with [`ProcessError::ProcessExited`] once the process's
    /// output has closed.
    pub async fn wait_for_port(&self, port: u16, options: PortOptions) -> Result<()> {
        let timeout = options.timeout.unwrap_or(self.config.port_timeout);
        let deadline = Instant::now() + timeout;

        let native =
            tokio::time::timeout_at(deadline, self.backend.wait_for_port_native(port, timeout))
                .await
                .map_err(|_| ProcessError::timeout("wait_for_port", timeout))?;
        if let Some(native) = native {
            return native;
        }

        let hostname = options
            .hostname
            .as_deref()
            .unwrap_or(&self.config.default_hostname);
        let url = self.backend.port_url(port, hostname).ok_or_else(|| {
            ProcessError::NotSupported(format!("port {port} is not reachable for this backend"))
        })?;

        self.ensure_pump();
        let prober = PortProber::new(
            self.probe.as_ref(),
            self.config.port_poll_interval,
            self.config.probe_timeout,
        );
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = prober
            .wait_until_ready(&url, remaining, || {
                self.pump
                    .state()
                    .is_done()
                    .then(|| ProcessError::exited(None))
            })
            .await;

        match outcome {
            Err(ProcessError::ProcessExited { .. }) => Err(self.exited_error(deadline).await),
            Err(ProcessError::Timeout { .. }) => Err(ProcessError::timeout("wait_for_port", timeout)),
            other => other,
        }
    }
}

#[async_trait]
impl<B: ProcessBackend> SandboxProcess for ProcessHandle<B> {
    fn id(&self) -> &str {
        &self.id
    }

    fn command(&self) -> &str {
        &self.command
    }

    async fn kill(&self, signal: Option<&str>) -> Result<()> {
        ProcessHandle::kill(self, signal).await
    }

    async fn logs(&self) -> LogSnapshot {
        ProcessHandle::logs(self).await
    }

    async fn wait(&self, timeout: Option<Duration>) -> Result<ExitOutcome> {
        ProcessHandle::wait(self, timeout).await
    }

    async fn wait_for_log(&self, pattern: Pattern, timeout: Option<Duration>) -> Result<LogMatch> {
        ProcessHandle::wait_for_log(self, pattern, timeout).await
    }

    async fn wait_for_port(&self, port: u16, options: PortOptions) -> Result<()> {
        ProcessHandle::wait_for_port(self, port, options).await
    }
}
