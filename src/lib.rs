//! Android Buddy Library
//!
//! Headless command-line front end over the adb session and transfer layers.

pub mod cli;
pub mod headless;

pub use cli::{run, Args, Command};
