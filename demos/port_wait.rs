//! Waiting for a port, and failing fast when the process dies first.
//!
//! Run with: cargo run --example port_wait
//!
//! A local TCP listener stands in for the sandboxed server. The provider is an
//! in-memory command that starts listening after a short delay.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::net::TcpListener;

use sandbox_process_rs::backend::generator::{CommandApi, GeneratorBackend};
use sandbox_process_rs::prelude::*;
use sandbox_process_rs::TcpProbe;

/// A command that prints its lines, then either keeps running or exits
/// with `exit_code`.
struct Script {
    lines: Vec<LogChunk>,
    keeps_running: bool,
    exit_code: i32,
}

#[async_trait]
impl CommandApi for Script {
    fn logs(&self) -> BoxStream<'static, anyhow::Result<LogChunk>> {
        let lines = stream::iter(self.lines.clone()).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(chunk)
        });
        if self.keeps_running {
            lines.chain(stream::pending()).boxed()
        } else {
            lines.boxed()
        }
    }

    async fn wait(&self) -> anyhow::Result<Option<i32>> {
        Ok(Some(self.exit_code))
    }

    async fn kill(&self, _signal: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn local_config() -> ProcessConfig {
    ProcessConfig::builder()
        .default_hostname("127.0.0.1")
        .port_poll_interval(Duration::from_millis(50))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    // A server that comes up after half a second
    println!("=== Port comes up ===");
    let port = {
        let reserved = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(ProcessError::transport)?;
        reserved.local_addr().map_err(ProcessError::transport)?.port()
    };
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            while listener.accept().await.is_ok() {}
        }
    });

    let process = ProcessHandle::with_config(
        "proc-1",
        "python -m http.server",
        GeneratorBackend::new(Script {
            lines: vec![LogChunk::stdout("Serving HTTP on 127.0.0.1\n")],
            keeps_running: true,
            exit_code: 0,
        }),
        local_config(),
    )?
    .with_probe(TcpProbe);

    match process
        .wait_for_port(port, PortOptions::timeout(Duration::from_secs(5)))
        .await
    {
        Ok(()) => println!("port {} is accepting connections", port),
        Err(e) => eprintln!("Error: {}", e),
    }
    server.abort();

    // A server that crashes before it ever listens
    println!("\n=== Process exits first ===");
    let crashed = ProcessHandle::with_config(
        "proc-2",
        "node server.js",
        GeneratorBackend::new(Script {
            lines: vec![LogChunk::stderr("Error: Cannot find module 'express'\n")],
            keeps_running: false,
            exit_code: 1,
        }),
        local_config(),
    )?
    .with_probe(TcpProbe);

    match crashed
        .wait_for_port(port, PortOptions::timeout(Duration::from_secs(30)))
        .await
    {
        Ok(()) => println!("unexpectedly ready"),
        Err(e) if e.is_process_exited() => {
            println!("failed fast: {} (exit code {:?})", e, e.exit_code());
            println!("stderr: {}", crashed.logs().await.stderr);
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
