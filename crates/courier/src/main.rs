// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - multi-channel communication dispatch.
//!
//! This is the binary entry point: the HTTP gateway, the background worker
//! and a few operator commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;

/// Courier - multi-channel communication dispatch.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway, and the dispatch worker unless disabled.
    Serve {
        /// Do not run the dispatch worker in this process.
        #[arg(long)]
        no_worker: bool,
    },
    /// Run only the dispatch worker (scheduled sends and retries).
    Worker,
    /// Process due scheduled sends and queued retries once, then exit.
    ProcessDue,
    /// Check that the configured providers accept their credentials.
    Verify {
        /// Channel to check (email, sms, portal_message); all when omitted.
        channel: Option<String>,
    },
    /// Seal a secret for use in settings (`enc:v1:...`).
    SealSecret,
}

fn load_config(path: Option<&PathBuf>) -> CourierConfig {
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.service.log_level);

    let result = match cli.command {
        Commands::Serve { no_worker } => serve::run_serve(config, !no_worker).await,
        Commands::Worker => serve::run_worker(config).await,
        Commands::ProcessDue => serve::run_process_due(config).await,
        Commands::Verify { channel } => admin::run_verify(config, channel.as_deref()).await,
        Commands::SealSecret => admin::run_seal_secret(&config),
    };

    if let Err(e) = result {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}
