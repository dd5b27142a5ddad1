//! Waiting for a readiness line from a command that streams its output.
//!
//! Run with: cargo run --example generator_readiness
//!
//! The provider here is an in-memory stand-in that prints a few lines of a dev
//! server starting up, then keeps running until it is killed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use sandbox_process_rs::backend::generator::{CommandApi, GeneratorBackend};
use sandbox_process_rs::prelude::*;

/// A fake dev server: a few startup lines, then silence until killed.
struct DevServer {
    exit: Arc<watch::Sender<Option<i32>>>,
}

impl DevServer {
    fn new() -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            exit: Arc::new(exit),
        }
    }
}

#[async_trait]
impl CommandApi for DevServer {
    fn logs(&self) -> BoxStream<'static, anyhow::Result<LogChunk>> {
        let lines = vec![
            LogChunk::stdout("> vite dev\n"),
            LogChunk::stderr("warning: using default config\n"),
            LogChunk::stdout("  VITE v5.0.0  ready in 312 ms\n"),
            LogChunk::stdout("  Local: http://localhost:5173/\n"),
        ];
        let exit = Arc::clone(&self.exit);

        let startup = stream::iter(lines).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(chunk)
        });
        let until_killed = stream::once(async move {
            let mut rx = exit.subscribe();
            let _ = rx.wait_for(Option::is_some).await;
        })
        .filter_map(|()| async { None });

        startup.chain(until_killed).boxed()
    }

    async fn wait(&self) -> anyhow::Result<Option<i32>> {
        let mut rx = self.exit.subscribe();
        let code = *rx.wait_for(Option::is_some).await?;
        Ok(code)
    }

    async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
        self.exit.send_replace(Some(143));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let process = ProcessHandle::new("proc-1", "npm run dev", GeneratorBackend::new(DevServer::new()));

    // Two callers wait on different lines of the same output
    println!("=== Waiting for readiness ===");
    let ready_line = Pattern::regex(r"ready in \d+ ms")?;
    let (ready, url) = tokio::join!(
        process.wait_for_log(ready_line, Some(Duration::from_secs(5))),
        process.wait_for_log("Local:", Some(Duration::from_secs(5))),
    );
    println!("ready line: {}", ready?.line);
    println!("url line:   {}", url?.line);

    println!("\n=== Logs so far ===");
    let logs = process.logs().await;
    println!("stdout:\n{}", logs.stdout);
    println!("stderr:\n{}", logs.stderr);

    // A pattern that never shows up times out, and the server keeps running
    println!("=== Waiting for a line that never comes ===");
    match process
        .wait_for_log("compiled with errors", Some(Duration::from_millis(300)))
        .await
    {
        Ok(found) => println!("unexpected match: {}", found.line),
        Err(e) if e.is_timeout() => println!("timed out as expected: {}", e),
        Err(e) => return Err(e),
    }

    println!("\n=== Shutting down ===");
    process.kill(None).await?;
    let exit = process.wait(Some(Duration::from_secs(5))).await?;
    println!("exit code: {}", exit.exit_code);

    Ok(())
}
