//! Process handle configuration with builder pattern.

use std::time::Duration;

use crate::error::{ProcessError, Result};

/// Timing and polling configuration for a process handle.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Deadline for `wait_for_log` when the caller does not pass one.
    pub wait_for_log_timeout: Duration,
    /// Deadline for `wait` when the caller does not pass one.
    pub wait_timeout: Duration,
    /// Deadline for `wait_for_port` when the caller does not pass one.
    pub port_timeout: Duration,
    /// Notifications arriving within this window are coalesced into one re-scan.
    pub debounce_window: Duration,
    /// Delay between port probe attempts.
    pub port_poll_interval: Duration,
    /// Ceiling for a single port probe attempt.
    pub probe_timeout: Duration,
    /// How long to wait for the provider's exit status once the log pump ends.
    pub exit_code_grace: Duration,
    /// Extra settle time in `logs()` after yielding to the scheduler.
    pub logs_settle: Duration,
    /// Hostname used for port probes when the caller does not pass one.
    pub default_hostname: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            wait_for_log_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(30),
            port_timeout: Duration::from_secs(30),
            debounce_window: Duration::from_millis(25),
            port_poll_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(1),
            exit_code_grace: Duration::from_secs(1),
            logs_settle: Duration::from_millis(10),
            default_hostname: "localhost".to_string(),
        }
    }
}

impl ProcessConfig {
    /// Create a new builder for ProcessConfig.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder::default()
    }

    /// Reject values that would make polling loops spin or never run.
    pub fn validate(&self) -> Result<()> {
        if self.port_poll_interval.is_zero() {
            return Err(ProcessError::Config(
                "port_poll_interval must be non-zero".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(ProcessError::Config(
                "probe_timeout must be non-zero".to_string(),
            ));
        }
        if self.default_hostname.is_empty() {
            return Err(ProcessError::Config(
                "default_hostname must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating ProcessConfig instances.
#[derive(Debug, Clone, Default)]
pub struct ProcessConfigBuilder {
    wait_for_log_timeout: Option<Duration>,
    wait_timeout: Option<Duration>,
    port_timeout: Option<Duration>,
    debounce_window: Option<Duration>,
    port_poll_interval: Option<Duration>,
    probe_timeout: Option<Duration>,
    exit_code_grace: Option<Duration>,
    logs_settle: Option<Duration>,
    default_hostname: Option<String>,
}

impl ProcessConfigBuilder {
    /// Set the default `wait_for_log` deadline.
    pub fn wait_for_log_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_log_timeout = Some(timeout);
        self
    }

    /// Set the default `wait` deadline.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set the default `wait_for_port` deadline.
    pub fn port_timeout(mut self, timeout: Duration) -> Self {
        self.port_timeout = Some(timeout);
        self
    }

    /// Set the re-scan debounce window.
    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = Some(window);
        self
    }

    /// Set the delay between port probe attempts.
    pub fn port_poll_interval(mut self, interval: Duration) -> Self {
        self.port_poll_interval = Some(interval);
        self
    }

    /// Set the per-attempt port probe ceiling.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set how long to wait for an exit status after the log pump ends.
    pub fn exit_code_grace(mut self, grace: Duration) -> Self {
        self.exit_code_grace = Some(grace);
        self
    }

    /// Set the settle time used by `logs()`.
    pub fn logs_settle(mut self, settle: Duration) -> Self {
        self.logs_settle = Some(settle);
        self
    }

    /// Set the hostname used for port probes.
    pub fn default_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.default_hostname = Some(hostname.into());
        self
    }

    /// Build the ProcessConfig.
    pub fn build(self) -> ProcessConfig {
        let default = ProcessConfig::default();
        ProcessConfig {
            wait_for_log_timeout: self
                .wait_for_log_timeout
                .unwrap_or(default.wait_for_log_timeout),
            wait_timeout: self.wait_timeout.unwrap_or(default.wait_timeout),
            port_timeout: self.port_timeout.unwrap_or(default.port_timeout),
            debounce_window: self.debounce_window.unwrap_or(default.debounce_window),
            port_poll_interval: self
                .port_poll_interval
                .unwrap_or(default.port_poll_interval),
            probe_timeout: self.probe_timeout.unwrap_or(default.probe_timeout),
            exit_code_grace: self.exit_code_grace.unwrap_or(default.exit_code_grace),
            logs_settle: self.logs_settle.unwrap_or(default.logs_settle),
            default_hostname: self.default_hostname.unwrap_or(default.default_hostname),
        }
    }
}
