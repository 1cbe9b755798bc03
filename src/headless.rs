//! Headless output - text or NDJSON events on stdout
//!
//! With `--json` every event is one JSON object per line, tagged by an
//! `event` field and stamped with a millisecond `timestamp`:
//!
//! ```json
//! {"event":"state","state":"running","timestamp":1704700001000}
//! {"event":"transfer","progress":{"status":"in_progress","fraction":0.39},"timestamp":1704700002000}
//! ```
//!
//! Without it the same events are rendered as plain lines.

use std::fmt;
use std::io::{self, Write};

use buddy_core::{
    Device, DirectoryEntry, EntryKind, InstallProgress, MovePrompt, RemotePath, SessionState,
    TransferProgress,
};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

/// Events reported by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    State { state: SessionState },
    Devices { devices: Vec<Device> },
    Entry { entry: DirectoryEntry },
    Exists { path: RemotePath, exists: bool },
    Transfer { progress: TransferProgress },
    Install { progress: InstallProgress },
    Move { prompt: MovePrompt },
    Output { text: String },
    Version { version: String },
    Done { operation: String },
    Cancelled { operation: String },
    Error { message: String, fatal: bool },
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    event: &'a HeadlessEvent,
    timestamp: i64,
}

impl HeadlessEvent {
    pub fn done(operation: impl Into<String>) -> Self {
        HeadlessEvent::Done {
            operation: operation.into(),
        }
    }

    /// Serialize as a single JSON line with the current timestamp.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope {
            event: self,
            timestamp: Utc::now().timestamp_millis(),
        })
    }
}

impl fmt::Display for HeadlessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadlessEvent::State { state } => write!(f, "adb: {state}"),
            HeadlessEvent::Devices { devices } if devices.is_empty() => {
                write!(f, "no devices attached")
            }
            HeadlessEvent::Devices { devices } => {
                let lines: Vec<String> = devices
                    .iter()
                    .map(|d| match &d.display_name {
                        Some(name) => format!("{}\t{}", d.serial, name),
                        None => d.serial.clone(),
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            HeadlessEvent::Entry { entry } => {
                let marker = match entry.kind {
                    EntryKind::Directory => "/",
                    EntryKind::Symlink => "@",
                    EntryKind::File => "",
                };
                write!(
                    f,
                    "{} {:>12} {} {}{}",
                    entry.permissions,
                    entry.size_bytes,
                    entry.modified_at.format("%Y-%m-%d %H:%M"),
                    entry.name,
                    marker
                )
            }
            HeadlessEvent::Exists { path, exists } => write!(f, "{path}: {exists}"),
            HeadlessEvent::Transfer {
                progress: TransferProgress::InProgress(fraction),
            } => write!(f, "{:>3.0}%", fraction * 100.0),
            HeadlessEvent::Transfer {
                progress: TransferProgress::Completed,
            } => write!(f, "100%"),
            HeadlessEvent::Install {
                progress: InstallProgress::InProgress,
            } => write!(f, "installing..."),
            HeadlessEvent::Install {
                progress: InstallProgress::Completed,
            } => write!(f, "installed"),
            HeadlessEvent::Move {
                prompt: MovePrompt::Nothing,
            } => Ok(()),
            HeadlessEvent::Move {
                prompt: MovePrompt::OverwriteConfirmationRequested(path),
            } => write!(f, "overwrite {path}? [y/N]"),
            HeadlessEvent::Output { text } => write!(f, "{}", text.trim_end()),
            HeadlessEvent::Version { version } => write!(f, "adb {version}"),
            HeadlessEvent::Done { operation } => write!(f, "{operation}: done"),
            HeadlessEvent::Cancelled { operation } => write!(f, "{operation}: cancelled"),
            HeadlessEvent::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

/// Writes events to stdout in the selected format
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    json: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn emit(&self, event: &HeadlessEvent) {
        let line = if self.json {
            match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize event {:?}: {}", event, e);
                    return;
                }
            }
        } else {
            let text = event.to_string();
            if text.is_empty() {
                return;
            }
            text
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            error!("Failed to write to stdout: {}", e);
        }
    }
}
