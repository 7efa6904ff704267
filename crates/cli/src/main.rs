// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use sm_cli::client::SmClient;
use sm_cli::command::{self, Command};
use sm_cli::config::SmConfig;

#[derive(Parser)]
#[command(name = "sm", version, about = "Address and message coding-agent sessions by name.")]
struct Cli {
    #[command(flatten)]
    config: SmConfig,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    let client = match SmClient::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    match command::dispatch(&client, &cli.config, cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
