//! Command-line front end
//!
//! Each subcommand maps onto one [`DeviceSession`] or [`TransferCoordinator`]
//! operation. Long-running operations stop cleanly on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use buddy_adb::{AdbLocator, AdbProcessRunner, ProcessRunner};
use buddy_app::config::{default_config_dir, init_config, load_settings, Settings};
use buddy_app::{DeviceSession, ProgressStream, SessionOptions, TransferCoordinator};
use buddy_core::prelude::*;
use buddy_core::{MovePrompt, OverwriteAnswer, RemotePath};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::headless::{HeadlessEvent, Reporter};

/// Android Buddy - browse, transfer and install files on Android devices
#[derive(Parser, Debug)]
#[command(name = "abuddy", version)]
#[command(about = "Browse, transfer and install files on Android devices through adb", long_about = None)]
pub struct Args {
    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print newline-delimited JSON events
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml
    #[arg(long, value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Restart the adb server and list attached devices
    Devices,
    /// Follow the session state and device list until Ctrl-C
    Watch,
    /// List a remote directory
    Ls { serial: String, path: String },
    /// Check whether a remote path exists
    Exists { serial: String, path: String },
    /// Copy a remote file or directory to the host
    Pull {
        serial: String,
        remote: String,
        local: PathBuf,
    },
    /// Copy a host file or directory to the device
    Push {
        serial: String,
        local: PathBuf,
        remote: String,
    },
    /// Install or replace an APK
    Install { serial: String, apk: PathBuf },
    /// Delete a remote file
    Rm {
        serial: String,
        path: String,
        /// Delete a directory and its contents
        #[arg(long)]
        dir: bool,
    },
    /// Create a remote directory
    Mkdir { serial: String, path: String },
    /// Move or rename remote items; the last path is the destination
    Mv {
        serial: String,
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
        /// Ask before overwriting (answers are read from stdin)
        #[arg(short, long)]
        interactive: bool,
    },
    /// Restart the adb server
    Reset,
    /// Run adb with arbitrary arguments
    Raw {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write a default config.toml
    InitConfig,
}

/// Run one subcommand to completion.
pub async fn run(args: Args) -> Result<()> {
    let reporter = Reporter::new(args.json);
    let config_dir = args.config_dir.clone().unwrap_or_else(default_config_dir);

    if args.command == Command::InitConfig {
        let path = init_config(&config_dir)?;
        reporter.emit(&HeadlessEvent::Output {
            text: path.display().to_string(),
        });
        return Ok(());
    }

    let settings = load_settings(&config_dir);
    let runner = Arc::new(build_runner(&settings)?);

    let result = dispatch(args.command, runner, &settings, reporter).await;
    if let Err(e) = &result {
        if reporter.is_json() {
            reporter.emit(&HeadlessEvent::Error {
                message: e.to_string(),
                fatal: e.is_fatal(),
            });
        }
    }
    result
}

fn build_runner(settings: &Settings) -> Result<AdbProcessRunner> {
    let executable = AdbLocator::new(settings.adb.path.clone()).locate()?;
    info!("Using adb at {}", executable.display());
    Ok(AdbProcessRunner::new(executable)
        .with_timeout(settings.adb.command_timeout())
        .with_terminal_type(settings.adb.terminal_type.clone()))
}

async fn dispatch<R: ProcessRunner + Sync + 'static>(
    command: Command,
    runner: Arc<R>,
    settings: &Settings,
    reporter: Reporter,
) -> Result<()> {
    // The CLI decides when the daemon restarts
    let options = SessionOptions {
        auto_reset: false,
        ..SessionOptions::from(&settings.session)
    };
    let session = DeviceSession::new(Arc::clone(&runner), options);
    let transfers = TransferCoordinator::new(runner);

    match command {
        Command::Devices => {
            session.reset().await?;
            reporter.emit(&HeadlessEvent::Devices {
                devices: session.devices(),
            });
        }
        Command::Watch => watch(&session, reporter).await?,
        Command::Reset => {
            session.reset().await?;
            reporter.emit(&HeadlessEvent::State {
                state: session.state(),
            });
        }
        Command::Ls { serial, path } => {
            for entry in session.list(&serial, &RemotePath::new(path)).await? {
                reporter.emit(&HeadlessEvent::Entry { entry });
            }
        }
        Command::Exists { serial, path } => {
            let path = RemotePath::new(path);
            let exists = session.does_file_exist(&serial, &path).await?;
            reporter.emit(&HeadlessEvent::Exists { path, exists });
        }
        Command::Rm { serial, path, dir } => {
            session.delete(&serial, &RemotePath::new(path), dir).await?;
            reporter.emit(&HeadlessEvent::done("rm"));
        }
        Command::Mkdir { serial, path } => {
            session
                .create_directory(&serial, &RemotePath::new(path))
                .await?;
            reporter.emit(&HeadlessEvent::done("mkdir"));
        }
        Command::Raw { args } => {
            let text = session.raw(&args).await?;
            reporter.emit(&HeadlessEvent::Output { text });
        }
        Command::Pull {
            serial,
            remote,
            local,
        } => {
            let stream = transfers.pull(&serial, &RemotePath::new(remote), &local)?;
            follow(stream, "pull", reporter, |progress| HeadlessEvent::Transfer {
                progress,
            })
            .await?;
        }
        Command::Push {
            serial,
            local,
            remote,
        } => {
            let stream = transfers.push(&serial, &local, &RemotePath::new(remote))?;
            follow(stream, "push", reporter, |progress| HeadlessEvent::Transfer {
                progress,
            })
            .await?;
        }
        Command::Install { serial, apk } => {
            let stream = transfers.install_apk(&serial, &apk)?;
            follow(stream, "install", reporter, |progress| HeadlessEvent::Install {
                progress,
            })
            .await?;
        }
        Command::Mv {
            serial,
            mut paths,
            interactive,
        } => {
            let destination = paths
                .pop()
                .map(RemotePath::new)
                .ok_or_else(|| Error::command("mv needs a destination"))?;
            let sources: Vec<RemotePath> = paths.into_iter().map(RemotePath::new).collect();
            let stream = transfers.move_items(&serial, &sources, &destination, interactive)?;
            answer_prompts(stream, reporter).await?;
        }
        // Needs no adb; handled in `run`
        Command::InitConfig => {}
    }

    Ok(())
}

/// Restart the daemon and report every state and device change.
async fn watch<R: ProcessRunner + Sync + 'static>(
    session: &DeviceSession<R>,
    reporter: Reporter,
) -> Result<()> {
    let mut state_rx = session.subscribe_state();
    let mut devices_rx = session.subscribe_devices();

    if let Err(e) = session.reset().await {
        warn!("Initial reset failed: {}", e);
        reporter.emit(&HeadlessEvent::Error {
            message: e.to_string(),
            fatal: e.is_fatal(),
        });
    }
    reporter.emit(&HeadlessEvent::State {
        state: *state_rx.borrow_and_update(),
    });
    reporter.emit(&HeadlessEvent::Devices {
        devices: devices_rx.borrow_and_update().clone(),
    });

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                reporter.emit(&HeadlessEvent::State { state });
            }
            changed = devices_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let devices = devices_rx.borrow_and_update().clone();
                reporter.emit(&HeadlessEvent::Devices { devices });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }
        }
    }
    Ok(())
}

/// Report a progress stream until it ends, fails or Ctrl-C cancels it.
async fn follow<T>(
    mut stream: ProgressStream<T>,
    operation: &str,
    reporter: Reporter,
    to_event: impl Fn(T) -> HeadlessEvent,
) -> Result<()> {
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => reporter.emit(&to_event(event?)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                reporter.emit(&HeadlessEvent::Cancelled { operation: operation.to_string() });
                return Ok(());
            }
        }
    }
    reporter.emit(&HeadlessEvent::done(operation));
    Ok(())
}

/// Relay overwrite prompts to the user, one stdin line per answer.
async fn answer_prompts(mut stream: ProgressStream<MovePrompt>, reporter: Reporter) -> Result<()> {
    let mut answers = BufReader::new(tokio::io::stdin()).lines();

    while let Some(event) = stream.next().await {
        let prompt = event?;
        reporter.emit(&HeadlessEvent::Move {
            prompt: prompt.clone(),
        });

        if let MovePrompt::OverwriteConfirmationRequested(path) = prompt {
            let line = answers.next_line().await?;
            let answer = parse_answer(line.as_deref());
            debug!("Overwrite {}: {:?}", path, answer);
            stream.answer(answer);
        }
    }

    reporter.emit(&HeadlessEvent::done("mv"));
    Ok(())
}

/// `y`/`yes` in any case overwrites; anything else, including EOF, declines.
fn parse_answer(line: Option<&str>) -> OverwriteAnswer {
    match line.map(|l| l.trim().to_ascii_lowercase()) {
        Some(answer) if answer == "y" || answer == "yes" => OverwriteAnswer::Yes,
        _ => OverwriteAnswer::No,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_adb::test_utils::FixtureRunner;

    #[test]
    fn test_parse_mv_arguments() {
        let args = Args::try_parse_from([
            "abuddy", "mv", "-i", "R5CT638F8ST", "/sdcard/a", "/sdcard/b", "/sdcard/dest",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Mv {
                serial: "R5CT638F8ST".into(),
                paths: vec!["/sdcard/a".into(), "/sdcard/b".into(), "/sdcard/dest".into()],
                interactive: true,
            }
        );
    }

    #[test]
    fn test_mv_requires_destination() {
        assert!(Args::try_parse_from(["abuddy", "mv", "R5CT638F8ST", "/sdcard/a"]).is_err());
    }

    #[test]
    fn test_parse_raw_passes_flags_through() {
        let args =
            Args::try_parse_from(["abuddy", "--json", "raw", "shell", "ls", "-la"]).unwrap();
        assert!(args.json);
        assert_eq!(
            args.command,
            Command::Raw {
                args: vec!["shell".into(), "ls".into(), "-la".into()]
            }
        );
    }

    #[test]
    fn test_parse_rm_dir_flag() {
        let args = Args::try_parse_from(["abuddy", "rm", "AAA", "/sdcard/Old", "--dir"]).unwrap();
        assert_eq!(
            args.command,
            Command::Rm {
                serial: "AAA".into(),
                path: "/sdcard/Old".into(),
                dir: true,
            }
        );
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(Some("y")), OverwriteAnswer::Yes);
        assert_eq!(parse_answer(Some(" YES \n")), OverwriteAnswer::Yes);
        assert_eq!(parse_answer(Some("n")), OverwriteAnswer::No);
        assert_eq!(parse_answer(Some("")), OverwriteAnswer::No);
        assert_eq!(parse_answer(None), OverwriteAnswer::No);
    }

    #[tokio::test]
    async fn test_dispatch_mkdir_runs_quoted_command() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_run(&["-s", "AAA", "shell", "mkdir", "'/sdcard/New Folder'"], "");

        let command = Command::Mkdir {
            serial: "AAA".into(),
            path: "/sdcard/New Folder".into(),
        };
        dispatch(command, Arc::clone(&runner), &Settings::default(), Reporter::new(true))
            .await
            .unwrap();

        assert_eq!(
            runner.call_count(&["-s", "AAA", "shell", "mkdir", "'/sdcard/New Folder'"]),
            1
        );
    }

    #[tokio::test]
    async fn test_dispatch_propagates_command_error() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_run(
            &["-s", "AAA", "shell", "rm", "-f", "'/system/x'"],
            "rm: /system/x: Read-only file system\n",
        );

        let command = Command::Rm {
            serial: "AAA".into(),
            path: "/system/x".into(),
            dir: false,
        };
        let result =
            dispatch(command, runner, &Settings::default(), Reporter::new(true)).await;
        assert!(matches!(result, Err(Error::CommandError { .. })));
    }
}
