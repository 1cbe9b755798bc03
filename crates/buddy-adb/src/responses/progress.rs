//! Transfer and install progress lines

use buddy_core::prelude::*;
use buddy_core::{InstallProgress, TransferProgress};

/// Sentinel printed by `adb install` before streaming the APK.
pub const INSTALL_STARTED: &str = "Performing Streamed Install";

/// Sentinel printed by `adb install` once the package is installed.
pub const INSTALL_SUCCEEDED: &str = "Success";

/// Parse one pull/push progress segment.
///
/// `[ 39%] /sdcard/x.iso` reports a percentage in the three characters after
/// the bracket. Any line without a bracket is adb's closing summary
/// (`/sdcard/x.iso: 1 file pulled, 0 skipped. 31.2 MB/s ...`).
pub fn parse_transfer_progress(line: &str) -> Result<TransferProgress> {
    let Some(rest) = line.strip_prefix('[') else {
        return Ok(TransferProgress::Completed);
    };

    let field: String = rest.chars().take(3).collect();
    let percent = field
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::parse(format!("invalid progress percentage in: {line:?}")))?;

    if percent >= 100 {
        Ok(TransferProgress::Completed)
    } else {
        Ok(TransferProgress::in_progress(f64::from(percent) / 100.0))
    }
}

/// Parse one `adb install` status line.
pub fn parse_install_progress(line: &str) -> Result<InstallProgress> {
    match line.trim() {
        INSTALL_STARTED => Ok(InstallProgress::InProgress),
        INSTALL_SUCCEEDED => Ok(InstallProgress::Completed),
        other => Err(Error::parse(format!("unexpected install output: {other:?}"))),
    }
}
