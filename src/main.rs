mod capabilities;
mod cmd;
mod config;
mod error;
mod platform;
mod providers;
mod report;
#[cfg(test)]
mod testing;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::capabilities::Capabilities;
use crate::platform::HostAmbient;
use crate::report::sink::ConsoleSink;
use crate::report::Context;

#[derive(Parser)]
#[command(
    name = "sysinspect",
    version,
    about = "Print a diagnostic report of this machine's hardware, OS, processes and firmware"
)]
struct Cli {
    /// Path to config file (default: ~/.config/sysinspect/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Disable colored headings
    #[arg(long)]
    no_color: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.no_color {
        config.color = false;
    }

    // Logs go to stderr so stdout carries only the report.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sysinspect starting");

    let caps = Capabilities::probe();
    let ambient = HostAmbient::detect();
    let options = config.report_options();
    let ctx = Context {
        caps: &caps,
        ambient: &ambient,
        options: &options,
    };

    let color = config.color && std::io::stdout().is_terminal();
    let mut sink = ConsoleSink::stdout(color);
    report::generate(&ctx, &mut sink);
    Ok(())
}
