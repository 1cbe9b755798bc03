//! `ls -lL` output parsing

use buddy_core::prelude::*;
use buddy_core::{DirectoryEntry, EntryKind, RemotePath};
use chrono::NaiveDateTime;

/// Prefix toybox `ls` puts on its own error lines.
const LS_ERROR_PREFIX: &str = "ls:";

const NOT_FOUND_MARKER: &str = "No such file or directory";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Column separators in `ls -l` output.
const COLUMN_SEPARATORS: [char; 2] = [' ', '\t'];

/// Parse a directory listing produced by `ls -lL <directory>`.
///
/// Lines whose permissions contain `?` are entries `ls` could not stat and
/// are skipped, as are device nodes, sockets and pipes. Any other malformed
/// line fails the whole parse.
pub fn parse_listing(directory: &RemotePath, output: &str) -> Result<Vec<DirectoryEntry>> {
    if output.trim_start().starts_with(LS_ERROR_PREFIX) {
        return Err(classify_ls_error(directory, output));
    }

    let mut lines = output.lines().peekable();
    // Aggregate block count; absent when a single file is listed
    if lines.peek().is_some_and(|line| line.starts_with("total")) {
        lines.next();
    }

    let mut entries = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = parse_line(directory, line)? {
            entries.push(entry);
        }
    }

    Ok(entries)
}

fn classify_ls_error(directory: &RemotePath, output: &str) -> Error {
    if output.contains(NOT_FOUND_MARKER) {
        Error::not_found(directory.as_str())
    } else {
        Error::command(output.trim_end())
    }
}

fn parse_line(directory: &RemotePath, line: &str) -> Result<Option<DirectoryEntry>> {
    let permissions = line.split_whitespace().next().unwrap_or_default();

    if permissions.contains('?') {
        trace!("skipping unreadable entry: {}", line);
        return Ok(None);
    }

    let Some(kind) = permissions.chars().next().and_then(EntryKind::from_type_char) else {
        trace!("skipping special file: {}", line);
        return Ok(None);
    };

    let (columns, name) = split_columns(line)
        .ok_or_else(|| Error::parse(format!("expected 8 columns in listing line: {line:?}")))?;
    let [permissions, links, owner, group, size, date, time] = columns;

    let link_count = links
        .parse::<u64>()
        .map_err(|_| Error::parse(format!("invalid link count {links:?} in: {line:?}")))?;
    let size_bytes = size
        .parse::<u64>()
        .map_err(|_| Error::parse(format!("invalid size {size:?} in: {line:?}")))?;
    let modified_at = NaiveDateTime::parse_from_str(&format!("{date} {time}"), DATE_FORMAT)
        .map_err(|_| Error::parse(format!("invalid timestamp {date} {time} in: {line:?}")))?;

    Ok(Some(DirectoryEntry {
        path: directory.join(name),
        name: name.to_string(),
        permissions: permissions.to_string(),
        link_count,
        owner: owner.to_string(),
        group: group.to_string(),
        size_bytes,
        modified_at,
        kind,
    }))
}

/// Split off the first seven columns; the remainder (spaces included) is the name.
fn split_columns(line: &str) -> Option<([&str; 7], &str)> {
    let mut columns = [""; 7];
    let mut rest = line;

    for column in columns.iter_mut() {
        rest = rest.trim_start_matches(COLUMN_SEPARATORS);
        let end = rest.find(COLUMN_SEPARATORS)?;
        *column = &rest[..end];
        rest = &rest[end..];
    }

    let name = rest.trim_start_matches(COLUMN_SEPARATORS);
    if name.is_empty() {
        None
    } else {
        Some((columns, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sdcard() -> RemotePath {
        RemotePath::new("/sdcard")
    }

    #[test]
    fn test_parse_fabricated_table() {
        let output = "total 48\n\
            drwxrws--- 2 u0_a245 media_rw 4096 2023-11-02 18:41 Alarms\n\
            -rw-rw---- 1 u0_a245 media_rw 1468006400 2024-02-29 07:05 F-Zero GX (USA).iso\n\
            lrwxrwxrwx 1 root root 21 2022-01-15 00:00 sdcard\n";

        let entries = parse_listing(&sdcard(), output).unwrap();
        assert_eq!(entries.len(), 3);

        let alarms = &entries[0];
        assert_eq!(alarms.name, "Alarms");
        assert_eq!(alarms.path, RemotePath::new("/sdcard/Alarms"));
        assert_eq!(alarms.kind, EntryKind::Directory);
        assert_eq!(alarms.permissions, "drwxrws---");
        assert_eq!(alarms.link_count, 2);
        assert_eq!(alarms.owner, "u0_a245");
        assert_eq!(alarms.group, "media_rw");
        assert_eq!(alarms.size_bytes, 4096);
        assert_eq!(
            alarms.modified_at,
            NaiveDate::from_ymd_opt(2023, 11, 2)
                .unwrap()
                .and_hms_opt(18, 41, 0)
                .unwrap()
        );

        let iso = &entries[1];
        assert_eq!(iso.name, "F-Zero GX (USA).iso");
        assert_eq!(iso.kind, EntryKind::File);
        assert_eq!(iso.size_bytes, 1_468_006_400);

        assert_eq!(entries[2].kind, EntryKind::Symlink);
    }

    #[test]
    fn test_name_kept_byte_for_byte() {
        let output = "total 4\n-rw-rw---- 1 root everybody 3 2024-01-01 10:00 two  spaces and trailing  \n";
        let entries = parse_listing(&sdcard(), output).unwrap();
        assert_eq!(entries[0].name, "two  spaces and trailing  ");
    }

    #[test]
    fn test_unknown_entries_skipped() {
        let output = "total 8\n\
            d????????? ? ? ? ? ? .android_secure\n\
            drwxrwx--x 3 root sdcard_rw 4096 2024-01-01 10:00 Download\n";
        let entries = parse_listing(&sdcard(), output).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Download");
    }

    #[test]
    fn test_special_files_skipped() {
        let output = "total 0\n\
            crw-rw-rw- 1 root root 1, 3 2024-01-01 10:00 null\n\
            -rw-r--r-- 1 root root 0 2024-01-01 10:00 plain\n";
        let entries = parse_listing(&RemotePath::new("/dev"), output).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, RemotePath::new("/dev/plain"));
    }

    #[test]
    fn test_empty_directory() {
        assert!(parse_listing(&sdcard(), "total 0\n").unwrap().is_empty());
        assert!(parse_listing(&sdcard(), "").unwrap().is_empty());
    }

    #[test]
    fn test_single_file_listing_has_no_total() {
        let output = "-rw-rw---- 1 root everybody 12 2024-01-01 10:00 /sdcard/notes.txt\n";
        let entries = parse_listing(&sdcard(), output).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_too_few_columns_is_parse_failure() {
        let output = "total 4\n-rw-rw---- 1 root everybody 12 2024-01-01 10:00\n";
        assert!(matches!(
            parse_listing(&sdcard(), output),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_non_integer_size_is_parse_failure() {
        let output = "total 4\n-rw-rw---- 1 root everybody 12K 2024-01-01 10:00 a\n";
        assert!(matches!(
            parse_listing(&sdcard(), output),
            Err(Error::ParseFailure { .. })
        ));

        let output = "total 4\n-rw-rw---- x root everybody 12 2024-01-01 10:00 a\n";
        assert!(matches!(
            parse_listing(&sdcard(), output),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_bad_timestamp_is_parse_failure() {
        let output = "total 4\n-rw-rw---- 1 root everybody 12 Jan 1 10:00 a\n";
        assert!(matches!(
            parse_listing(&sdcard(), output),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let output = "ls: /sdcard/nope: No such file or directory\n";
        match parse_listing(&RemotePath::new("/sdcard/nope"), output) {
            Err(Error::NotFound { path }) => assert_eq!(path, "/sdcard/nope"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_other_ls_errors_are_command_errors() {
        let output = "ls: /data: Permission denied\n";
        assert!(matches!(
            parse_listing(&RemotePath::new("/data"), output),
            Err(Error::CommandError { .. })
        ));
    }
}
