// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use sam_agent::config::Config;
use sam_agent::store::MigrationError;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "text" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }

    if let Err(e) = sam_agent::run(config).await {
        error!("fatal: {e:#}");
        // Exit codes are operational contract: 1 fatal config/runtime,
        // 2 store migration failure.
        if e.chain().any(|cause| cause.downcast_ref::<MigrationError>().is_some()) {
            std::process::exit(2);
        }
        std::process::exit(1);
    }
}
