// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::{env, process};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use loggen::PipelineDriver;

/// Generate synthetic log traffic from templates and ship it to a sink.
#[derive(Debug, Parser)]
#[command(name = "loggen", version)]
struct Cli {
    /// JSON run configuration
    config: PathBuf,

    /// Template files, one template group per file
    #[arg(required = true, num_args = 1..)]
    templates: Vec<PathBuf>,
}

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();

    let log_level = env::var("LOGGEN_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let mut driver = match PipelineDriver::bootstrap(&cli.config, &cli.templates) {
        Ok(driver) => driver,
        Err(e) => {
            error!("Error starting loggen: {e}");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
    });

    let snapshot = driver.run(cancel).await;
    info!("loggen stopped: {snapshot}");
}
