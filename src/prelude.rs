//! Prelude module for convenient imports.

pub use crate::error::{ProcessError, Result};
pub use crate::process::{
    buffer::{LogChunk, LogSnapshot, PumpState, StreamKind},
    config::ProcessConfig,
    handle::{ExitOutcome, LogMatch, PortOptions, ProcessHandle, SandboxProcess},
    matcher::Pattern,
};
