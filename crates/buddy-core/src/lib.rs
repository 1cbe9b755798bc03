//! # buddy-core - Core Domain Types
//!
//! Foundation crate for Android Buddy. Provides domain types, error handling,
//! terminal escape stripping and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, regex, tracing, percent-encoding).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`] - An attached device (serial + best-effort display name)
//! - [`SessionState`] - Lifecycle of the adb daemon (`NotRunning` → `SettingUp` → `Running` | `Error`)
//! - [`DirectoryEntry`], [`EntryKind`] - One parsed line of a remote directory listing
//! - [`RemotePath`] - A POSIX path on the device
//! - [`TransferProgress`], [`InstallProgress`] - Progress of pull/push and install
//! - [`MovePrompt`], [`OverwriteAnswer`] - Interactive move prompts and their answers
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum covering process, output-classification and config failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Logs context next to an error as it propagates
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use buddy_core::prelude::*;
//! ```

pub mod ansi;
pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Android Buddy crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use ansi::strip_ansi_codes;
pub use error::{Error, Result, ResultExt};
pub use types::{
    Device, DirectoryEntry, EntryKind, InstallProgress, MovePrompt, OverwriteAnswer, RemotePath,
    SessionState, TransferProgress,
};
