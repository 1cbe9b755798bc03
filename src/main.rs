//! Android Buddy - browse, transfer and install files on Android devices
//!
//! This is the binary entry point. All logic lives in the library.

use android_buddy::Args;
use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if let Err(e) = buddy_core::logging::init(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    android_buddy::run(args).await?;
    Ok(())
}
