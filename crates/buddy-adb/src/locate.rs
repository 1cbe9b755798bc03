//! adb executable discovery
//!
//! Resolution order: an explicitly configured path, the SDK's
//! `platform-tools` under `ANDROID_HOME` / `ANDROID_SDK_ROOT`, then `PATH`.

use std::path::{Path, PathBuf};

use buddy_core::prelude::*;

use crate::commands::AdbCommand;
use crate::process::ProcessRunner;

const ADB_BINARY: &str = if cfg!(windows) { "adb.exe" } else { "adb" };

const SDK_ENV_VARS: [&str; 2] = ["ANDROID_HOME", "ANDROID_SDK_ROOT"];

/// Finds the adb executable
#[derive(Debug, Clone, Default)]
pub struct AdbLocator {
    configured: Option<PathBuf>,
}

impl AdbLocator {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self { configured }
    }

    /// Resolve the executable, failing with [`Error::AdbNotFound`].
    ///
    /// A configured path that does not exist is reported rather than
    /// silently replaced by another adb.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(path) = &self.configured {
            if path.is_file() {
                debug!("Using configured adb at {}", path.display());
                return Ok(path.clone());
            }
            warn!("Configured adb path does not exist: {}", path.display());
            return Err(Error::AdbNotFound);
        }

        for candidate in Self::sdk_candidates() {
            if candidate.is_file() {
                debug!("Using SDK adb at {}", candidate.display());
                return Ok(candidate);
            }
        }

        which::which(ADB_BINARY)
            .inspect(|path| debug!("Using adb from PATH at {}", path.display()))
            .map_err(|e| {
                debug!("adb not found on PATH: {}", e);
                Error::AdbNotFound
            })
    }

    /// `platform-tools/adb` under each SDK root named in the environment
    fn sdk_candidates() -> Vec<PathBuf> {
        SDK_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|root| platform_tools_adb(Path::new(&root)))
            .collect()
    }
}

fn platform_tools_adb(sdk_root: &Path) -> PathBuf {
    sdk_root.join("platform-tools").join(ADB_BINARY)
}

/// Run `adb version` and return the version banner line.
pub async fn probe_version<R: ProcessRunner>(runner: &R) -> Result<String> {
    let output = runner.run(&AdbCommand::Version.args()).await?;
    parse_version(&output).ok_or_else(|| Error::parse(format!("unexpected version output: {output:?}")))
}

/// Extract `1.0.41` from `Android Debug Bridge version 1.0.41`.
pub fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Android Debug Bridge version "))
        .map(|version| version.trim().to_string())
}
