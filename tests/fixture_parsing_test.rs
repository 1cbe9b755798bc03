//! Captured adb output fixtures run through the sanitizer and parsers

use buddy_adb::responses::{
    parse_device_list, parse_install_progress, parse_listing, parse_move_prompt,
    parse_transfer_progress,
};
use buddy_adb::sanitize;
use buddy_core::{
    strip_ansi_codes, EntryKind, Error, InstallProgress, MovePrompt, RemotePath, TransferProgress,
};

#[test]
fn test_devices_fixture_parses() {
    let raw = include_str!("fixtures/adb_output/devices.txt");
    let output = sanitize(raw).unwrap();
    assert!(output.starts_with("List of devices attached"));
    assert_eq!(
        parse_device_list(&output),
        vec!["R5CT638F8ST", "emulator-5554"]
    );
}

#[test]
fn test_daemon_failure_fixture_wins_over_tool_error() {
    let raw = include_str!("fixtures/adb_output/daemon_failure.txt");
    assert!(matches!(sanitize(raw), Err(Error::DaemonStartFailure)));
}

#[test]
fn test_sdcard_listing_fixture_parses() {
    let raw = include_str!("fixtures/adb_output/listing_sdcard.txt");
    let sdcard = RemotePath::new("/sdcard");
    let entries = parse_listing(&sdcard, &sanitize(raw).unwrap()).unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Alarms",
            "Android",
            "Voice Recorder",
            "F-Zero GX (USA).iso",
            ".nomedia"
        ]
    );

    let iso = &entries[3];
    assert_eq!(iso.kind, EntryKind::File);
    assert_eq!(iso.size_bytes, 1_468_006_400);
    assert_eq!(iso.path, RemotePath::new("/sdcard/F-Zero GX (USA).iso"));
    assert!(entries[2].is_directory());
}

#[test]
fn test_missing_listing_fixture_is_not_found() {
    let raw = include_str!("fixtures/adb_output/listing_missing.txt");
    let result = parse_listing(&RemotePath::new("/sdcard/Nope"), &sanitize(raw).unwrap());
    match result {
        Err(Error::NotFound { path }) => assert_eq!(path, "/sdcard/Nope"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_pull_progress_fixture_segments() {
    let raw = include_str!("fixtures/adb_output/pull_progress.txt");
    let clean = strip_ansi_codes(raw);

    let mut updates: Vec<TransferProgress> = Vec::new();
    for segment in clean.split(['\r', '\n']) {
        let segment = sanitize(segment).unwrap();
        if segment.trim().is_empty() {
            continue;
        }
        let progress = parse_transfer_progress(segment.trim_end()).unwrap();
        if updates.last() != Some(&progress) {
            updates.push(progress);
        }
    }

    assert_eq!(
        updates,
        vec![
            TransferProgress::InProgress(0.0),
            TransferProgress::InProgress(0.12),
            TransferProgress::InProgress(0.57),
            TransferProgress::Completed,
        ]
    );
}

#[test]
fn test_pull_missing_fixture_is_tool_error() {
    let raw = include_str!("fixtures/adb_output/pull_missing.txt");
    match sanitize(raw) {
        Err(Error::ToolError { output }) => assert!(output.contains("failed to stat")),
        other => panic!("expected ToolError, got {other:?}"),
    }
}

#[test]
fn test_move_prompt_fixture_parses() {
    let raw = include_str!("fixtures/adb_output/move_prompt.txt");
    assert_eq!(
        parse_move_prompt(&sanitize(raw).unwrap()).unwrap(),
        MovePrompt::OverwriteConfirmationRequested(RemotePath::new("/sdcard/Roms/x.iso"))
    );
}

#[test]
fn test_install_fixture_parses() {
    let raw = include_str!("fixtures/adb_output/install.txt");
    let events: Vec<InstallProgress> = sanitize(raw)
        .unwrap()
        .lines()
        .map(|line| parse_install_progress(line).unwrap())
        .collect();
    assert_eq!(
        events,
        vec![InstallProgress::InProgress, InstallProgress::Completed]
    );
}
