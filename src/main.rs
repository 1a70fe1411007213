// src/main.rs

//! The main entry point for the liverelay server application.

use anyhow::{Context, Result, anyhow};
use liverelay::config::Config;
use liverelay::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("LIVERELAY_BUILD_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("liverelay version {VERSION}");
        return Ok(());
    }

    // `--config <path>` is optional; without it `config.toml` is used when present.
    let config_path = flag_value(&args, "--config")?;
    let mut config = Config::load(config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    config.apply_env_overrides()?;

    if let Some(port) = flag_value(&args, "--port")? {
        config.port = port
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid port number: {port}"))?;
        config.validate()?;
    }

    // RUST_LOG takes precedence over the configured level.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    info!("Starting liverelay {VERSION}.");
    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Returns the value following `flag`, or an error if the flag is present without one.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|arg| arg == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| anyhow!("{flag} flag requires a value")),
        None => Ok(None),
    }
}
