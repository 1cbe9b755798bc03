//! adb argument vectors
//!
//! Verbs run through `adb shell` receive single-quoted remote paths because
//! the device shell re-splits its command line. `pull`/`push`/`install`
//! receive paths verbatim.

use std::path::PathBuf;

use buddy_core::RemotePath;

/// Device shell pipeline that prints the bluetooth adapter name.
pub const DISPLAY_NAME_QUERY: &str = "dumpsys bluetooth_manager | grep 'name:' | cut -c9-";

/// Commands issued to adb
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbCommand {
    /// Enumerate attached devices
    Devices,
    /// Stop the background server
    KillServer,
    /// Start the background server
    StartServer,
    /// Print adb's version banner
    Version,
    /// Best-effort human readable device name
    DisplayName { serial: String },
    /// `ls -lL` of a directory
    List { serial: String, path: RemotePath },
    /// Copy a device file to the host
    Pull {
        serial: String,
        remote: RemotePath,
        local: PathBuf,
    },
    /// Copy a host file to the device
    Push {
        serial: String,
        local: PathBuf,
        remote: RemotePath,
    },
    /// Install (or replace) an APK
    Install { serial: String, apk: PathBuf },
    /// `rm -f`, or `rm -rf` for directories
    Delete {
        serial: String,
        path: RemotePath,
        recursive: bool,
    },
    MakeDirectory { serial: String, path: RemotePath },
    /// `mv -i` (prompts before overwriting) or `mv -n` (never overwrites)
    Move {
        serial: String,
        sources: Vec<RemotePath>,
        destination: RemotePath,
        interactive: bool,
    },
    /// Caller-supplied arguments, passed through untouched
    Raw(Vec<String>),
}

impl AdbCommand {
    /// Build the argument vector (without the adb executable itself)
    pub fn args(&self) -> Vec<String> {
        match self {
            AdbCommand::Devices => strings(["devices", "-l"]),
            AdbCommand::KillServer => strings(["kill-server"]),
            AdbCommand::StartServer => strings(["start-server"]),
            AdbCommand::Version => strings(["version"]),
            AdbCommand::DisplayName { serial } => {
                shell(serial, [DISPLAY_NAME_QUERY.to_string()])
            }
            AdbCommand::List { serial, path } => shell(
                serial,
                ["ls".to_string(), "-lL".to_string(), path.shell_quoted()],
            ),
            AdbCommand::Pull {
                serial,
                remote,
                local,
            } => targeted(
                serial,
                [
                    "pull".to_string(),
                    remote.to_string(),
                    local.to_string_lossy().into_owned(),
                ],
            ),
            AdbCommand::Push {
                serial,
                local,
                remote,
            } => targeted(
                serial,
                [
                    "push".to_string(),
                    local.to_string_lossy().into_owned(),
                    remote.to_string(),
                ],
            ),
            AdbCommand::Install { serial, apk } => targeted(
                serial,
                [
                    "install".to_string(),
                    "-r".to_string(),
                    apk.to_string_lossy().into_owned(),
                ],
            ),
            AdbCommand::Delete {
                serial,
                path,
                recursive,
            } => {
                let flags = if *recursive { "-rf" } else { "-f" };
                shell(
                    serial,
                    ["rm".to_string(), flags.to_string(), path.shell_quoted()],
                )
            }
            AdbCommand::MakeDirectory { serial, path } => {
                shell(serial, ["mkdir".to_string(), path.shell_quoted()])
            }
            AdbCommand::Move {
                serial,
                sources,
                destination,
                interactive,
            } => {
                let flag = if *interactive { "-i" } else { "-n" };
                let operands = sources
                    .iter()
                    .chain(std::iter::once(destination))
                    .map(RemotePath::shell_quoted);
                shell(
                    serial,
                    ["mv".to_string(), flag.to_string()]
                        .into_iter()
                        .chain(operands),
                )
            }
            AdbCommand::Raw(args) => args.clone(),
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            AdbCommand::Devices => "list devices",
            AdbCommand::KillServer => "kill server",
            AdbCommand::StartServer => "start server",
            AdbCommand::Version => "version",
            AdbCommand::DisplayName { .. } => "device name",
            AdbCommand::List { .. } => "list directory",
            AdbCommand::Pull { .. } => "pull",
            AdbCommand::Push { .. } => "push",
            AdbCommand::Install { .. } => "install",
            AdbCommand::Delete { .. } => "delete",
            AdbCommand::MakeDirectory { .. } => "create directory",
            AdbCommand::Move { .. } => "move",
            AdbCommand::Raw(_) => "raw command",
        }
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

fn targeted(serial: &str, rest: impl IntoIterator<Item = String>) -> Vec<String> {
    ["-s".to_string(), serial.to_string()]
        .into_iter()
        .chain(rest)
        .collect()
}

fn shell(serial: &str, rest: impl IntoIterator<Item = String>) -> Vec<String> {
    targeted(serial, std::iter::once("shell".to_string()).chain(rest))
}
