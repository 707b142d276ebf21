//! Steady CLI - Financial behavior insights for irregular income
//!
//! Usage:
//!   steady init                       Initialize the model database
//!   steady ingest --file CSV          Fold transactions into behavior models
//!   steady insights --user 1          Show dashboard insights
//!   steady serve --port 3000          Start the REST API

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Ingest { file, user } => {
            let engine = commands::open_engine(&cli.db, config_path)?;
            commands::cmd_ingest(&engine, &file, user).map(|_| ())
        }
        Commands::Insights { user, json } => {
            let engine = commands::open_engine(&cli.db, config_path)?;
            commands::cmd_insights(&engine, user, json)
        }
        Commands::Model { user } => {
            let engine = commands::open_engine(&cli.db, config_path)?;
            commands::cmd_model(&engine, user)
        }
        Commands::Users => commands::cmd_users(&cli.db),
        Commands::Reset { user } => {
            let engine = commands::open_engine(&cli.db, config_path)?;
            commands::cmd_reset(&engine, user)
        }
        Commands::Config { path } => commands::cmd_config(config_path, path),
        Commands::Serve { port, host } => {
            let engine = commands::open_engine(&cli.db, config_path)?;
            commands::cmd_serve(engine, &host, port).await
        }
    }
}
