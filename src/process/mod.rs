//! Log synchronization and readiness primitives.

pub mod buffer;
pub mod config;
pub mod handle;
pub mod matcher;
pub mod probe;
pub mod pump;
pub mod waiters;
