//! hidport-enum - list attached HID interfaces
//!
//! Set `HIDPORT_FORMAT=json` for machine-readable output.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const FORMAT_ENV: &str = "HIDPORT_FORMAT";

#[derive(Parser)]
#[command(name = "hidport-enum", author, version)]
#[command(about = "Enumerate attached HID devices and print their descriptors")]
struct Cli {}

fn main() -> Result<()> {
    let _cli = Cli::parse();

    // Keep stdout for the listing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let json = match std::env::var(FORMAT_ENV) {
        Ok(v) if v.eq_ignore_ascii_case("json") => true,
        Ok(v) if v.is_empty() || v.eq_ignore_ascii_case("text") => false,
        Ok(v) => anyhow::bail!("{FORMAT_ENV} must be 'text' or 'json', got '{v}'"),
        Err(_) => false,
    };

    let lib = hidport::global();
    lib.init().context("Failed to initialize HID library")?;

    let devices = lib.enumerate(0, 0).context("Failed to enumerate HID devices")?;
    debug!("Found {} HID interface(s)", devices.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        println!(
            "Loaded {} backend from: {}",
            lib.backend_name()?,
            lib.backend_location()?
        );
        for dev in &devices {
            println!("{}", "-".repeat(60));
            println!("{dev}");
        }
    }

    lib.shutdown().context("Failed to shut down HID library")?;
    Ok(())
}
