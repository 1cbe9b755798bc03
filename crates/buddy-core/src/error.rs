//! Error taxonomy shared by every Android Buddy crate

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("adb executable not found. Install the Android platform-tools or set [adb] path.")]
    AdbNotFound,

    #[error("Failed to spawn adb: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Pseudo-terminal error: {message}")]
    Pty { message: String },

    #[error("adb {command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    // ─────────────────────────────────────────────────────────────
    // adb Output Errors
    // ─────────────────────────────────────────────────────────────
    #[error("The adb daemon failed to start")]
    DaemonStartFailure,

    #[error("adb reported an error: {output}")]
    ToolError { output: String },

    #[error("Command failed: {output}")]
    CommandError { output: String },

    #[error("adb produced output that is not valid UTF-8")]
    NonDecodableOutput,

    #[error("Unexpected adb output: {context}")]
    ParseFailure { context: String },

    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn process_spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn pty(message: impl Into<String>) -> Self {
        Self::Pty {
            message: message.into(),
        }
    }

    pub fn tool(output: impl Into<String>) -> Self {
        Self::ToolError {
            output: output.into(),
        }
    }

    pub fn command(output: impl Into<String>) -> Self {
        Self::CommandError {
            output: output.into(),
        }
    }

    pub fn parse(context: impl Into<String>) -> Self {
        Self::ParseFailure {
            context: context.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable, operation-level error.
    ///
    /// Recoverable errors leave the session state untouched; the caller may
    /// simply retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ToolError { .. }
                | Error::CommandError { .. }
                | Error::NonDecodableOutput
                | Error::ParseFailure { .. }
                | Error::NotFound { .. }
                | Error::Timeout { .. }
        )
    }

    /// Check if this error requires an explicit daemon reset
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DaemonStartFailure | Error::AdbNotFound | Error::ProcessSpawn { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Log `context` alongside the error, keeping the error itself
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }
}
