//! Polling a port until something accepts connections.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{ProcessError, Result};
use crate::trace;

/// One readiness check against a URL.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Succeed if the target accepted the attempt within `attempt_timeout`.
    async fn probe(&self, url: &str, attempt_timeout: Duration) -> Result<()>;
}

/// Probe that issues an HTTP GET; any response, whatever its status, counts.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a probe that reuses an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str, attempt_timeout: Duration) -> Result<()> {
        self.client
            .get(url)
            .timeout(attempt_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(ProcessError::transport)
    }
}

/// Probe that only opens a TCP connection to the URL's host and port.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, url: &str, attempt_timeout: Duration) -> Result<()> {
        let addr = authority(url)?;
        match tokio::time::timeout(attempt_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProcessError::transport(e)),
            Err(_) => Err(ProcessError::timeout("tcp connect", attempt_timeout)),
        }
    }
}

/// Extract `host:port` from a URL such as `http://localhost:3000/health`.
fn authority(url: &str) -> Result<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host_port = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host_port.is_empty() || !host_port.contains(':') {
        return Err(ProcessError::Config(format!(
            "cannot derive host:port from {url:?}"
        )));
    }
    Ok(host_port)
}

/// Repeatedly probes a URL at a fixed interval.
pub struct PortProber<'a> {
    probe: &'a dyn Probe,
    interval: Duration,
    attempt_timeout: Duration,
}

impl<'a> PortProber<'a> {
    /// Create a prober polling every `interval`, each attempt capped at `attempt_timeout`.
    pub fn new(probe: &'a dyn Probe, interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            probe,
            interval,
            attempt_timeout,
        }
    }

    /// Poll `url` until an attempt succeeds, `timeout` elapses, or `exited`
    /// reports the process is gone.
    ///
    /// `exited` returns `Some(error)` to abort with that error.
    pub async fn wait_until_ready<F>(&self, url: &str, timeout: Duration, exited: F) -> Result<()>
    where
        F: Fn() -> Option<ProcessError> + Send + Sync,
    {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        loop {
            if let Some(err) = exited() {
                return Err(err);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ProcessError::timeout("wait_for_port", timeout));
            }
            let budget = self.attempt_timeout.min(deadline - now);

            attempts += 1;
            match tokio::time::timeout(budget, self.probe.probe(url, budget)).await {
                Ok(Ok(())) => {
                    trace::debug!(url, attempts, "port is accepting connections");
                    return Ok(());
                }
                Ok(Err(_err)) => {
                    trace::trace!(url, attempts, error = %_err, "port probe failed");
                }
                Err(_) => {
                    trace::trace!(url, attempts, "port probe timed out");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                if let Some(err) = exited() {
                    return Err(err);
                }
                return Err(ProcessError::timeout("wait_for_port", timeout));
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
