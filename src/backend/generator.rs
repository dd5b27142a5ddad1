//! Adapter for providers whose commands expose output as a chunk stream.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::backend::{ExitContract, ProcessBackend, RawExit};
use crate::error::{ProcessError, Result};
use crate::process::buffer::LogChunk;
use crate::process::pump::LogStream;

/// Provider command that yields `{stream, data}` chunks from a one-shot stream.
#[async_trait]
pub trait CommandApi: Send + Sync + 'static {
    /// Begin streaming output. The returned stream can only be read once.
    fn logs(&self) -> BoxStream<'static, anyhow::Result<LogChunk>>;

    /// Wait for the command to finish; `None` when the provider omitted the code.
    async fn wait(&self) -> anyhow::Result<Option<i32>>;

    /// Terminate the command.
    async fn kill(&self, signal: &str) -> anyhow::Result<()>;
}

/// [`ProcessBackend`] over a [`CommandApi`].
pub struct GeneratorBackend<C> {
    command: Arc<C>,
}

impl<C: CommandApi> GeneratorBackend<C> {
    /// Wrap a provider command.
    pub fn new(command: C) -> Self {
        Self::from_arc(Arc::new(command))
    }

    /// Wrap a provider command shared with other owners.
    pub fn from_arc(command: Arc<C>) -> Self {
        Self { command }
    }

    /// The wrapped command.
    pub fn command(&self) -> &Arc<C> {
        &self.command
    }
}

#[async_trait]
impl<C: CommandApi> ProcessBackend for GeneratorBackend<C> {
    fn open_logs(&self) -> LogStream {
        self.command.logs().boxed()
    }

    async fn wait(&self) -> Result<RawExit> {
        let code = self
            .command
            .wait()
            .await
            .map_err(ProcessError::from_backend)?;
        Ok(RawExit {
            code,
            success: None,
        })
    }

    async fn kill(&self, signal: &str) -> Result<()> {
        self.command
            .kill(signal)
            .await
            .map_err(ProcessError::from_backend)
    }

    // a finished command that reports no code finished cleanly
    fn exit_contract(&self) -> ExitContract {
        ExitContract::SuccessImpliesZero
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct Scripted;

    #[async_trait]
    impl CommandApi for Scripted {
        fn logs(&self) -> BoxStream<'static, anyhow::Result<LogChunk>> {
            stream::iter(vec![Ok(LogChunk::stdout("hi\n"))]).boxed()
        }

        async fn wait(&self) -> anyhow::Result<Option<i32>> {
            Ok(None)
        }

        async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("already gone"))
        }
    }

    #[tokio::test]
    async fn test_missing_code_means_success() {
        let backend = GeneratorBackend::new(Scripted);
        let raw = backend.wait().await.unwrap();
        assert_eq!(raw.normalize(backend.exit_contract()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_kill_error_is_transport() {
        let backend = GeneratorBackend::new(Scripted);
        let err = backend.kill("SIGTERM").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_open_logs_forwards_chunks() {
        let backend = GeneratorBackend::new(Scripted);
        let chunks: Vec<_> = backend.open_logs().collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &LogChunk::stdout("hi\n"));
    }
}
