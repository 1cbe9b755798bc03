//! Device session: adb daemon lifecycle and device discovery
//!
//! A [`DeviceSession`] owns the adb server for the whole process. It exposes
//! its [`SessionState`] and device list as `watch` channels; consumers only
//! ever see snapshots.
//!
//! ```text
//! NotRunning --reset--> SettingUp --kill, cooldown, start, enumerate--> Running
//! SettingUp  --any step fails--> Error
//! Running    --reset--> SettingUp
//! ```
//!
//! While `Running`, a background task re-enumerates devices every poll
//! interval and publishes the list only when it differs by value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use buddy_adb::responses::{
    expect_silent, parse_device_list, parse_display_name, parse_listing,
};
use buddy_adb::{probe_version, AdbCommand, ProcessRunner};
use buddy_core::prelude::*;
use buddy_core::{Device, DirectoryEntry, RemotePath, SessionState};
use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::config::SessionSettings;

/// Timing and startup behaviour of a [`DeviceSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub daemon_restart_cooldown: Duration,
    pub auto_reset: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            daemon_restart_cooldown: settings.daemon_restart_cooldown(),
            auto_reset: settings.auto_reset,
        }
    }
}

/// Owner of the adb daemon and the attached device list.
pub struct DeviceSession<R> {
    inner: Arc<SessionInner<R>>,
    shutdown_tx: watch::Sender<bool>,
}

struct SessionInner<R> {
    runner: Arc<R>,
    state_tx: watch::Sender<SessionState>,
    devices_tx: watch::Sender<Vec<Device>>,
    /// Serializes resets; a second caller waits for the first to finish
    reset_lock: Mutex<()>,
    /// Bumped by every reset; a poll that saw a different value is stale
    generation: AtomicU64,
    cooldown: Duration,
}

impl<R: ProcessRunner + Sync + 'static> DeviceSession<R> {
    /// Create a session and start its polling task.
    ///
    /// With `auto_reset`, the daemon reset runs in the background; observe
    /// [`subscribe_state`](Self::subscribe_state) for the outcome.
    pub fn new(runner: Arc<R>, options: SessionOptions) -> Self {
        let (state_tx, _) = watch::channel(SessionState::NotRunning);
        let (devices_tx, _) = watch::channel(Vec::new());
        let inner = Arc::new(SessionInner {
            runner,
            state_tx,
            devices_tx,
            reset_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            cooldown: options.daemon_restart_cooldown,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(poll_devices(
            Arc::clone(&inner),
            options.poll_interval,
            shutdown_rx,
        ));

        if options.auto_reset {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let _ = inner.reset().await;
            });
        }

        Self { inner, shutdown_tx }
    }

    /// Restart the adb daemon and enumerate devices.
    ///
    /// Any failure leaves the session in [`SessionState::Error`] until the
    /// next reset. There is no internal retry.
    pub async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.inner.devices_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Vec<Device>> {
        self.inner.devices_tx.subscribe()
    }

    /// Wait until the session leaves `NotRunning`/`SettingUp`.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe_state();
        let settled = rx
            .wait_for(|state| matches!(state, SessionState::Running | SessionState::Error))
            .await
            .map(|state| *state);
        // The sender lives in `self.inner`, so the channel cannot close here
        settled.unwrap_or(SessionState::Error)
    }

    /// List a directory on `serial`.
    pub async fn list(&self, serial: &str, path: &RemotePath) -> Result<Vec<DirectoryEntry>> {
        let command = AdbCommand::List {
            serial: serial.to_string(),
            path: path.clone(),
        };
        let output = self.inner.runner.run(&command.args()).await?;
        parse_listing(path, &output)
    }

    /// Whether `path` exists on `serial`.
    ///
    /// Only a not-found listing means `false`; other errors propagate.
    pub async fn does_file_exist(&self, serial: &str, path: &RemotePath) -> Result<bool> {
        match self.list(serial, path).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a file, or a directory tree with `recursive`.
    pub async fn delete(&self, serial: &str, path: &RemotePath, recursive: bool) -> Result<()> {
        let command = AdbCommand::Delete {
            serial: serial.to_string(),
            path: path.clone(),
            recursive,
        };
        self.run_silent(&command).await
    }

    pub async fn create_directory(&self, serial: &str, path: &RemotePath) -> Result<()> {
        let command = AdbCommand::MakeDirectory {
            serial: serial.to_string(),
            path: path.clone(),
        };
        self.run_silent(&command).await
    }

    /// Run arbitrary adb arguments and return the sanitized output.
    pub async fn raw(&self, args: &[String]) -> Result<String> {
        let command = AdbCommand::Raw(args.to_vec());
        info!("Running raw command: adb {}", args.join(" "));
        self.inner.runner.run(&command.args()).await
    }

    /// adb's version number, e.g. `1.0.41`.
    pub async fn adb_version(&self) -> Result<String> {
        probe_version(self.inner.runner.as_ref()).await
    }

    async fn run_silent(&self, command: &AdbCommand) -> Result<()> {
        debug!("{}: adb {}", command.description(), command.args().join(" "));
        let output = self.inner.runner.run(&command.args()).await?;
        expect_silent(&output)
    }
}

impl<R> Drop for DeviceSession<R> {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl<R: ProcessRunner + Sync + 'static> SessionInner<R> {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!("Session state: {}", state);
        }
    }

    /// Publish `devices` if they differ from the current list.
    fn publish_devices(&self, devices: Vec<Device>) -> bool {
        let changed = self.devices_tx.send_if_modified(|current| {
            if *current == devices {
                false
            } else {
                *current = devices;
                true
            }
        });
        if changed {
            debug!("Device list changed: {:?}", *self.devices_tx.borrow());
        }
        changed
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.reset_lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("Resetting adb daemon");
        self.set_state(SessionState::SettingUp);

        match self.restart_daemon().await {
            Ok(devices) => {
                // Devices first, so observers of Running never see an empty list
                self.publish_devices(devices);
                self.set_state(SessionState::Running);
                Ok(())
            }
            Err(e) => {
                error!("adb daemon reset failed: {}", e);
                self.publish_devices(Vec::new());
                self.set_state(SessionState::Error);
                Err(e)
            }
        }
    }

    async fn restart_daemon(&self) -> Result<Vec<Device>> {
        self.runner.run(&AdbCommand::KillServer.args()).await?;
        // Back-to-back kill/start leaves the server in a broken state
        tokio::time::sleep(self.cooldown).await;
        self.runner.run(&AdbCommand::StartServer.args()).await?;
        self.discover().await
    }

    /// Enumerate devices and look up their names concurrently.
    async fn discover(&self) -> Result<Vec<Device>> {
        let output = self.runner.run(&AdbCommand::Devices.args()).await?;
        let serials = parse_device_list(&output);
        trace!("Discovered serials: {:?}", serials);

        let lookups = serials.into_iter().map(|serial| async move {
            let display_name = self.display_name(&serial).await;
            Device::new(serial, display_name)
        });
        Ok(join_all(lookups).await)
    }

    /// Best-effort; any failure is an absent name.
    async fn display_name(&self, serial: &str) -> Option<String> {
        let command = AdbCommand::DisplayName {
            serial: serial.to_string(),
        };
        match self.runner.run(&command.args()).await {
            Ok(output) => parse_display_name(&output),
            Err(e) => {
                debug!("Name lookup failed for {}: {}", serial, e);
                None
            }
        }
    }

    async fn poll_once(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.discover().await;

        // A reset may have started, or even finished, while discovery ran
        if !self.state().is_running() || self.generation.load(Ordering::SeqCst) != generation {
            trace!("Session was reset during discovery, dropping result");
            return;
        }

        match result {
            Ok(devices) => {
                self.publish_devices(devices);
            }
            Err(e) if e.is_fatal() => {
                error!("Device polling hit a fatal error: {}", e);
                self.publish_devices(Vec::new());
                self.set_state(SessionState::Error);
            }
            Err(e) if e.is_recoverable() => {
                debug!("Device polling failed: {}", e);
                self.publish_devices(Vec::new());
            }
            Err(e) => {
                warn!("Device polling failed unexpectedly: {}", e);
                self.publish_devices(Vec::new());
            }
        }
    }
}

/// Re-enumerate devices every `interval` while the session is running.
async fn poll_devices<R: ProcessRunner + Sync + 'static>(
    inner: Arc<SessionInner<R>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; reset does the initial discovery
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if inner.state().is_running() {
                    inner.poll_once().await;
                }
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Device polling stopped");
                    break;
                }
            }
        }
    }
}
