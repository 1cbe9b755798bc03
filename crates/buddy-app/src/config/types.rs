//! Configuration types for Android Buddy

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound on the device poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

/// Application settings (config.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub adb: AdbSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

/// How adb is invoked
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdbSettings {
    /// Explicit adb executable; otherwise the SDK and PATH are searched
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upper bound on blocking commands (ls, rm, devices, ...)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// TERM for interactive sessions
    #[serde(default = "default_terminal_type")]
    pub terminal_type: String,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            path: None,
            command_timeout_ms: default_command_timeout_ms(),
            terminal_type: default_terminal_type(),
        }
    }
}

impl AdbSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Device session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Device discovery period while the daemon is running
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause between `kill-server` and `start-server`
    #[serde(default = "default_daemon_restart_cooldown_ms")]
    pub daemon_restart_cooldown_ms: u64,

    /// Reset the daemon as soon as a session is created
    #[serde(default = "default_true")]
    pub auto_reset: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            daemon_restart_cooldown_ms: default_daemon_restart_cooldown_ms(),
            auto_reset: true,
        }
    }
}

impl SessionSettings {
    /// Poll interval, never below [`MIN_POLL_INTERVAL_MS`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn daemon_restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.daemon_restart_cooldown_ms)
    }
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_terminal_type() -> String {
    buddy_adb::DEFAULT_TERMINAL_TYPE.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_daemon_restart_cooldown_ms() -> u64 {
    3_000
}

fn default_true() -> bool {
    true
}
