// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use crossway::config::{Launch, SimConfig};

#[derive(Debug, Parser)]
#[command(name = "crossway", about = "Cooperative intersection-safety simulation kernel")]
struct Cli {
    #[command(flatten)]
    sim: SimConfig,

    #[command(flatten)]
    launch: Launch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = crossway::run(cli.sim, cli.launch).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
