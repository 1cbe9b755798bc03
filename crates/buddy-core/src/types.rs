//! Domain types shared between the adb layer and its consumers

use std::fmt;

use chrono::NaiveDateTime;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the adb daemon as seen by a device session.
///
/// Transitions are linear except for the self-loop back to `SettingUp` on an
/// explicit reset. Device polling only happens while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    NotRunning,
    SettingUp,
    Running,
    Error,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NotRunning => write!(f, "not running"),
            SessionState::SettingUp => write!(f, "setting up"),
            SessionState::Running => write!(f, "running"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// An attached device.
///
/// Identity is the serial; the display name is best-effort and may be absent.
/// Device lists are rebuilt wholesale on every discovery cycle and compared by
/// value to suppress redundant updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Device {
    pub fn new(serial: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            serial: serial.into(),
            display_name,
        }
    }

    /// Name to show to a user, falling back to the serial
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.serial)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote paths
// ─────────────────────────────────────────────────────────────────────────────

/// Characters escaped when a remote path is percent-encoded: controls,
/// whitespace and `%` itself.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

/// A POSIX path on the device.
///
/// Stored exactly as the device reports it; no normalisation is applied
/// beyond joining with a single `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePath(String);

impl RemotePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a child component.
    pub fn join(&self, name: &str) -> RemotePath {
        if self.0.is_empty() {
            return RemotePath(name.to_string());
        }
        if self.0.ends_with('/') {
            RemotePath(format!("{}{}", self.0, name))
        } else {
            RemotePath(format!("{}/{}", self.0, name))
        }
    }

    /// Last path component, ignoring a trailing slash.
    pub fn file_name(&self) -> Option<&str> {
        let trimmed = self.0.trim_end_matches('/');
        trimmed
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// The containing directory, if any.
    pub fn parent(&self) -> Option<RemotePath> {
        let trimmed = self.0.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        if idx == 0 {
            Some(RemotePath("/".to_string()))
        } else {
            Some(RemotePath(trimmed[..idx].to_string()))
        }
    }

    /// Quote the path for the device shell.
    ///
    /// Single quotes make every character literal; embedded single quotes are
    /// closed, escaped and reopened.
    pub fn shell_quoted(&self) -> String {
        format!("'{}'", self.0.replace('\'', r"'\''"))
    }

    /// Percent-encode controls, whitespace and `%`.
    pub fn percent_encoded(&self) -> String {
        utf8_percent_encode(&self.0, PATH_ENCODE_SET).to_string()
    }

    /// Rebuild a path from its percent-encoded form.
    ///
    /// Returns `None` when the decoded bytes are not UTF-8, the result is
    /// empty, or it contains a NUL byte (never valid in a POSIX path).
    pub fn from_percent_encoded(encoded: &str) -> Option<RemotePath> {
        let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
        if decoded.is_empty() || decoded.contains('\0') {
            return None;
        }
        Some(RemotePath(decoded.into_owned()))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        RemotePath::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        RemotePath(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory listings
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a listed entry, from the first character of its permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    /// Map the leading permissions character (`d`, `-`, `l`).
    pub fn from_type_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(EntryKind::Directory),
            '-' => Some(EntryKind::File),
            'l' => Some(EntryKind::Symlink),
            _ => None,
        }
    }
}

/// One line of a directory listing.
///
/// Identity is `path`. Names are kept byte-for-byte, including embedded and
/// trailing spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: RemotePath,
    pub name: String,
    pub permissions: String,
    pub link_count: u64,
    pub owner: String,
    pub group: String,
    pub size_bytes: u64,
    pub modified_at: NaiveDateTime,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress and prompts
// ─────────────────────────────────────────────────────────────────────────────

/// Progress of a pull or push.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "fraction", rename_all = "snake_case")]
pub enum TransferProgress {
    /// Fraction complete, always within `0.0..=1.0`
    InProgress(f64),
    Completed,
}

impl TransferProgress {
    /// Build an in-progress value, clamping the fraction into `0.0..=1.0`.
    pub fn in_progress(fraction: f64) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        TransferProgress::InProgress(fraction)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TransferProgress::Completed)
    }
}

/// Progress of an APK install. adb reports no percentage for installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallProgress {
    InProgress,
    Completed,
}

/// One decoded event from an interactive move session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "prompt", content = "path", rename_all = "snake_case")]
pub enum MovePrompt {
    /// Nothing to answer
    Nothing,
    /// The device asks whether `path` may be overwritten. The session is
    /// blocked until an [`OverwriteAnswer`] is written.
    OverwriteConfirmationRequested(RemotePath),
}

/// Answer to an overwrite confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteAnswer {
    Yes,
    No,
}

impl OverwriteAnswer {
    /// Text written to the session; the runner appends the newline.
    pub fn as_input(&self) -> &'static str {
        match self {
            OverwriteAnswer::Yes => "y",
            OverwriteAnswer::No => "n",
        }
    }
}
