//! # buddy-app - Device Session and Transfers
//!
//! Orchestrates adb on behalf of a user interface: daemon lifecycle, device
//! discovery and the long-running transfer operations.
//!
//! ## Public API
//!
//! - [`DeviceSession`] - Daemon reset, state machine, device polling and
//!   one-shot file operations (`ls`, exists, `rm`, `mkdir`)
//! - [`TransferCoordinator`] - Pull, push, install and move as cancellable
//!   [`ProgressStream`]s
//! - [`config`] - `config.toml` loading

pub mod config;
pub mod session;
pub mod transfer;

pub use session::{DeviceSession, SessionOptions};
pub use transfer::{
    InstallStream, MoveStream, ProgressStream, TransferCoordinator, TransferStream,
};
