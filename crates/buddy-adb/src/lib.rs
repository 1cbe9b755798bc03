//! # buddy-adb - adb Process Management
//!
//! Runs the `adb` executable, classifies its output and parses the responses
//! Android Buddy relies on.
//!
//! Depends on [`buddy_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`ProcessRunner`] - Blocking and pseudo-terminal backed adb invocations
//! - [`AdbProcessRunner`] - The real implementation
//! - [`InteractiveCommand`] - Chunk stream, [`SessionWriter`] and [`CancelHandle`] of a live session
//! - [`AdbLocator`] - Find the adb executable
//!
//! ### Output Handling
//! - [`sanitize()`] - Detect daemon/tool failures, strip adb log lines
//! - [`responses`] - Devices, listings, progress, install and move prompt parsers
//! - [`AdbCommand`] - Argument vectors for every verb used

pub mod commands;
pub mod interactive;
pub mod locate;
pub mod process;
mod pty;
pub mod responses;
pub mod sanitize;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use commands::AdbCommand;
pub use interactive::{CancelHandle, ExitSignal, InteractiveCommand, SessionIo, SessionWriter};
pub use locate::{parse_version, probe_version, AdbLocator};
pub use process::{
    AdbProcessRunner, LocalProcessRunner, ProcessRunner, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_TERMINAL_TYPE,
};
pub use sanitize::sanitize;
