//! # Sandbox Process
//!
//! Readiness waits and replayable logs for long-running commands inside
//! remote sandboxes.
//!
//! Sandbox providers hand back a running command whose output can be read
//! exactly once: an async chunk stream, a pair of byte streams, or a
//! snapshot endpoint that has to be polled. This crate wraps any of them in a
//! [`ProcessHandle`] that many tasks can observe at the same time:
//!
//! - **Replayable logs**: a single background pump drains the provider's
//!   output into a shared, append-only buffer
//! - **Readiness waits**: block until a line matches a string or regex, with
//!   distinct errors for timeouts and for processes that exit first
//! - **Port waits**: poll until a port accepts connections
//! - **Exit status**: wait for an exit code without guessing when the
//!   provider omits it
//!
//! ## Example
//!
//! ```rust,ignore
//! use sandbox_process_rs::backend::generator::{CommandApi, GeneratorBackend};
//! use sandbox_process_rs::prelude::*;
//! use std::time::Duration;
//!
//! async fn start(command: impl CommandApi) -> Result<()> {
//!     let process = ProcessHandle::new("proc-1", "npm run dev", GeneratorBackend::new(command));
//!
//!     let ready = process
//!         .wait_for_log(Pattern::regex(r"listening on \d+")?, Some(Duration::from_secs(30)))
//!         .await?;
//!     println!("ready: {}", ready.line);
//!
//!     process.kill(None).await?;
//!     let exit = process.wait(Some(Duration::from_secs(5))).await?;
//!     println!("exit code: {}", exit.exit_code);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! 1. **One reader**: the provider's log source is opened once, by the first
//!    call that needs output
//! 2. **Wake everyone**: each appended chunk wakes every waiter; waiters do
//!    their own matching against the full buffer
//! 3. **Races, not cancellation**: a timed-out wait leaves the pump and the
//!    process running

mod trace;

pub mod backend;
pub mod error;
pub mod prelude;
pub mod process;

// Re-export main types at crate root for convenience
pub use backend::{ExitContract, ProcessBackend, RawExit};
pub use error::{ProcessAlreadyExited, ProcessError, Result};
pub use process::buffer::{LogBuffer, LogChunk, LogSnapshot, PumpState, StreamKind};
pub use process::config::{ProcessConfig, ProcessConfigBuilder};
pub use process::handle::{ExitOutcome, LogMatch, PortOptions, ProcessHandle, SandboxProcess};
pub use process::matcher::{Pattern, RescanState};
pub use process::probe::{HttpProbe, PortProber, Probe, TcpProbe};
pub use process::pump::{LogPump, LogStream};
