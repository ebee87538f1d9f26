// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dripmail - disposable email addresses behind a chat bot.
//!
//! This is the binary entry point for the dripmail agent.

use clap::{Parser, Subcommand};

mod serve;
mod transport;

/// Dripmail - disposable email addresses behind a chat bot.
#[derive(Parser, Debug)]
#[command(name = "dripmail", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the dripmail agent.
    Serve,
    /// Load and validate configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match dripmail_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            dripmail_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("dripmail: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Check) => {
            println!(
                "dripmail: config ok (backend={}, gateway={})",
                match config.mailbox.backend {
                    dripmail_config::model::BackendKind::Remote => "remote",
                    dripmail_config::model::BackendKind::Smtp => "smtp",
                },
                if config.gateway.enabled { "enabled" } else { "disabled" },
            );
        }
        None => {
            println!("dripmail: use --help for available commands");
        }
    }
}
