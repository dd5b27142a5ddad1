//! Provider adapters.
//!
//! Each provider exposes running commands in its own shape. The adapters in
//! this module turn those shapes into a [`ProcessBackend`], which is the only
//! thing [`ProcessHandle`](crate::ProcessHandle) knows about.

pub mod dual_stream;
pub mod generator;
pub mod polling;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ProcessError, Result};
use crate::process::buffer::LogSnapshot;
use crate::process::matcher::Pattern;
use crate::process::pump::LogStream;

/// How a provider's missing exit code should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitContract {
    /// The provider only omits the code for successful exits.
    SuccessImpliesZero,
    /// A missing code carries no information.
    Explicit,
}

/// Exit information as reported by a provider, before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawExit {
    /// Numeric exit code, if reported.
    pub code: Option<i32>,
    /// Success flag, if reported separately from the code.
    pub success: Option<bool>,
}

impl RawExit {
    /// Exit with a known code.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: Some(code == 0),
        }
    }

    /// Exit with no information at all.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Resolve the exit code, or `None` when it cannot be determined.
    pub fn resolve(&self, contract: ExitContract) -> Option<i32> {
        match (self.code, self.success, contract) {
            (Some(code), _, _) => Some(code),
            (None, Some(true), _) => Some(0),
            (None, None, ExitContract::SuccessImpliesZero) => Some(0),
            _ => None,
        }
    }

    /// Resolve the exit code, failing when it cannot be determined.
    pub fn normalize(&self, contract: ExitContract) -> Result<i32> {
        self.resolve(contract).ok_or(ProcessError::UnknownExitCode)
    }
}

/// Uniform view of one provider process.
///
/// Implementations wrap a provider-native command object. `open_logs` is
/// called at most once per handle; everything else may be called any number
/// of times.
#[async_trait]
pub trait ProcessBackend: Send + Sync + 'static {
    /// Open the provider's live output source.
    fn open_logs(&self) -> LogStream;

    /// Wait for the process to exit.
    async fn wait(&self) -> Result<RawExit>;

    /// Ask the provider to terminate the process.
    async fn kill(&self, signal: &str) -> Result<()>;

    /// How a missing exit code is interpreted for this provider.
    fn exit_contract(&self) -> ExitContract {
        ExitContract::Explicit
    }

    /// Output the provider retained before anyone started reading.
    async fn historical_logs(&self) -> Result<Option<LogSnapshot>> {
        Ok(None)
    }

    /// Provider-side readiness wait, if the provider has one.
    async fn wait_for_log_native(
        &self,
        _pattern: &Pattern,
        _timeout: Duration,
    ) -> Option<Result<String>> {
        None
    }

    /// Provider-side port wait, if the provider has one.
    async fn wait_for_port_native(
        &self,
        _port: u16,
        _timeout: Duration,
    ) -> Option<Result<()>> {
        None
    }

    /// URL a client-side port probe should hit, or `None` if ports cannot be
    /// reached from here.
    fn port_url(&self, port: u16, hostname: &str) -> Option<String> {
        Some(format!("http://{hostname}:{port}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_wins() {
        assert_eq!(RawExit::code(3).normalize(ExitContract::Explicit).unwrap(), 3);
        let raw = RawExit {
            code: Some(0),
            success: Some(false),
        };
        assert_eq!(raw.resolve(ExitContract::Explicit), Some(0));
    }

    #[test]
    fn test_missing_code_follows_contract() {
        let unknown = RawExit::unknown();
        assert_eq!(unknown.resolve(ExitContract::SuccessImpliesZero), Some(0));
        assert!(matches!(
            unknown.normalize(ExitContract::Explicit),
            Err(ProcessError::UnknownExitCode)
        ));

        let succeeded = RawExit {
            code: None,
            success: Some(true),
        };
        assert_eq!(succeeded.resolve(ExitContract::Explicit), Some(0));

        let failed = RawExit {
            code: None,
            success: Some(false),
        };
        assert_eq!(failed.resolve(ExitContract::SuccessImpliesZero), None);
    }
}
