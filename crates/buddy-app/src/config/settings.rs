//! Settings loading and initialisation

use std::path::{Path, PathBuf};

use buddy_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "config.toml";

const APP_DIR: &str = "android-buddy";

const DEFAULT_CONFIG: &str = r#"# Android Buddy Configuration

[adb]
# path = "/opt/android-sdk/platform-tools/adb"  # Defaults to $ANDROID_HOME, then PATH
command_timeout_ms = 30000       # Upper bound for ls, rm, mkdir, devices ...
terminal_type = "xterm-256color" # TERM for pull/push/install/mv sessions

[session]
poll_interval_ms = 1000            # Device discovery period (minimum 250)
daemon_restart_cooldown_ms = 3000  # Pause between kill-server and start-server
auto_reset = true                  # Restart the adb server on startup
"#;

/// `<platform config dir>/android-buddy`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Load settings from `config_dir/config.toml`.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config file unless one already exists.
///
/// Returns the path of the config file.
pub fn init_config(config_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(config_dir)
        .map_err(|e| Error::config(format!("Failed to create {:?}: {}", config_dir, e)))?;

    let config_path = config_dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        debug!("Config already exists at {:?}", config_path);
        return Ok(config_path);
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write {:?}: {}", config_path, e)))?;
    info!("Created default config at {:?}", config_path);

    Ok(config_path)
}
