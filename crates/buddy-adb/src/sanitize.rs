//! Classification and cleanup of raw adb output
//!
//! Every blocking command and every interactive chunk passes through
//! [`sanitize`] before a response parser sees it. The daemon sentinel is
//! checked before the tool error prefix: when the daemon cannot start, adb
//! prints both, and only the former requires a reset.

use buddy_core::prelude::*;

/// Line printed by adb when the background server cannot be started.
pub const DAEMON_START_FAILURE: &str = "* failed to start daemon";

/// Prefix adb puts in front of its own error messages.
pub const TOOL_ERROR_PREFIX: &str = "adb:";

/// Prefix of adb's diagnostic chatter (`* daemon not running; starting now`).
pub const LOG_MARKER_PREFIX: &str = "* ";

/// Classify raw output and strip adb's log lines.
///
/// Leading whitespace is trimmed, trailing whitespace is kept (file names may
/// end in spaces). Errors carry the untrimmed input.
pub fn sanitize(raw: &str) -> Result<String> {
    let trimmed = raw.trim_start();
    let lines: Vec<&str> = trimmed.split('\n').collect();

    if lines.iter().any(|line| is_daemon_failure(line)) {
        warn!("adb daemon failed to start");
        return Err(Error::DaemonStartFailure);
    }

    if lines
        .iter()
        .any(|line| line.trim_start().starts_with(TOOL_ERROR_PREFIX))
    {
        debug!("adb reported an error: {}", raw.trim());
        return Err(Error::tool(raw));
    }

    let payload = lines
        .into_iter()
        .filter(|line| !line.trim_start().starts_with(LOG_MARKER_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");

    // Dropping a leading log line can expose blank lines
    Ok(payload.trim_start().to_string())
}

fn is_daemon_failure(line: &str) -> bool {
    line.trim_start().trim_end_matches('\r') == DAEMON_START_FAILURE
}
