//! CLI argument definitions using clap
//!
//! This module contains the clap structs for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Steady - Financial behavior insights for irregular income
#[derive(Parser)]
#[command(name = "steady")]
#[command(about = "Income volatility and spending behavior insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "steady.db", global = true)]
    pub db: PathBuf,

    /// Configuration file (TOML). Falls back to the user override, then built-in defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the model database
    Init,

    /// Ingest classified transactions from CSV
    Ingest {
        /// CSV file to ingest
        #[arg(short, long)]
        file: PathBuf,

        /// User id for rows without a user_id column
        #[arg(short, long)]
        user: Option<i64>,
    },

    /// Show dashboard insights for a user
    Insights {
        /// User id
        #[arg(short, long)]
        user: i64,

        /// Print the insights as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stored behavior model for a user as JSON
    Model {
        /// User id
        #[arg(short, long)]
        user: i64,
    },

    /// List users with a stored model
    Users,

    /// Delete a user's behavior model
    Reset {
        /// User id
        #[arg(short, long)]
        user: i64,
    },

    /// Show the effective configuration
    Config {
        /// Print the user override path instead of the configuration
        #[arg(long)]
        path: bool,
    },

    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
