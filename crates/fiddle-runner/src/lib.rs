//! Fiddle runner backed by a child process.
//!
//! Re-exports [`ProcessRunner`], the [`fiddle_core::RunnerBridge`] used by the
//! `fiddle` binary.

pub mod command;
pub mod process;

pub use command::{expand_command, DIR_PLACEHOLDER, VERSION_PLACEHOLDER};
pub use process::ProcessRunner;
