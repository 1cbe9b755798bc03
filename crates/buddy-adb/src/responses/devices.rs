//! `adb devices -l` and device name lookups

/// Parse the serials out of `adb devices -l` output.
///
/// The first line is the `List of devices attached` header. The serial is
/// the first token of every other line; blank lines are skipped.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// First non-empty line of the bluetooth name lookup, if any.
pub fn parse_display_name(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
