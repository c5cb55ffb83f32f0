// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Portage - bridges a polled message source to a bound delivery destination.
//!
//! This is the binary entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod serve;
mod webhook;

/// Portage - reliable message bridging from a polled source.
#[derive(Parser, Debug)]
#[command(name = "portage", version, about, long_about = None)]
struct Cli {
    /// Path to a specific config file (otherwise the XDG hierarchy is used).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the poll loop until interrupted.
    Serve,
    /// Print the current synchronization status.
    Status,
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => portage_config::load_config_from_path(path),
        None => portage_config::load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("portage: configuration error: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) | None => serve::run(config).await,
        Some(Commands::Status) => print_status(&config).await,
        Some(Commands::Config) => print_config(&config),
    };

    if let Err(err) = result {
        eprintln!("portage: {err}");
        std::process::exit(1);
    }
}

async fn print_status(
    config: &portage_config::PortageConfig,
) -> Result<(), portage_core::PortageError> {
    let store = portage_store::StateStore::open(&config.storage.data_dir.join("state.db")).await?;
    let record = store.load().await?;
    let status = &record.status;

    println!("connected:         {}", status.connected);
    println!("last poll:         {}", format_ts(status.last_poll_at));
    println!("last success:      {}", format_ts(status.last_success_at));
    println!("last keepalive:    {}", format_ts(status.last_keepalive_at));
    println!(
        "last error:        {}",
        status.last_error.as_deref().unwrap_or("-")
    );
    println!(
        "bound target:      {}",
        record.bound_target_id.as_deref().unwrap_or("-")
    );
    println!("stored messages:   {}", record.messages.len());
    println!("pending bundles:   {}", record.pending_bundles.len());
    Ok(())
}

fn print_config(
    config: &portage_config::PortageConfig,
) -> Result<(), portage_core::PortageError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| portage_core::PortageError::Internal(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn format_ts(ts: Option<i64>) -> String {
    match ts.and_then(chrono::DateTime::from_timestamp_millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "-".to_string(),
    }
}
