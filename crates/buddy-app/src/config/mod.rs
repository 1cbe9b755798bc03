//! Configuration file handling for Android Buddy
//!
//! Settings live in `<config dir>/android-buddy/config.toml`. A missing or
//! malformed file falls back to defaults.

pub mod settings;
pub mod types;

pub use settings::{default_config_dir, init_config, load_settings, CONFIG_FILENAME};
pub use types::*;
