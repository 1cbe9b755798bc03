//! Parsers for sanitized adb output
//!
//! Every parser is pure and operates on text already passed through
//! [`crate::sanitize`]. Malformed input yields [`Error::ParseFailure`]
//! (or a more specific classification), never a panic.
//!
//! [`Error::ParseFailure`]: buddy_core::Error::ParseFailure

mod devices;
mod listing;
mod moves;
mod progress;

pub use devices::{parse_device_list, parse_display_name};
pub use listing::parse_listing;
pub use moves::parse_move_prompt;
pub use progress::{parse_install_progress, parse_transfer_progress};

use buddy_core::prelude::*;

/// Accept output from commands that print nothing on success
/// (`rm`, `mkdir`, `mv -n`). Anything else is the device's error message.
pub fn expect_silent(output: &str) -> Result<()> {
    if output.trim().is_empty() {
        Ok(())
    } else {
        Err(Error::command(output.trim_end()))
    }
}
