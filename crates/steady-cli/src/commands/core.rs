//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_store` / `open_engine` - Shared utilities to open the model database
//! - `cmd_init` - Initialize the database
//! - `cmd_users` - List users with a stored model
//! - `cmd_config` - Show the effective configuration

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use steady_core::{default_config_path, BehaviorEngine, SqliteStore, SteadyConfig};

/// Open the SQLite model store, creating it and running migrations if needed
pub fn open_store(db_path: &Path) -> Result<SqliteStore> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    SqliteStore::new(path_str).context("Failed to open database")
}

/// Load configuration from an explicit file, the user override, or the defaults
pub fn load_config(config_path: Option<&Path>) -> Result<SteadyConfig> {
    SteadyConfig::load(config_path).context("Failed to load configuration")
}

pub fn open_engine(db_path: &Path, config_path: Option<&Path>) -> Result<BehaviorEngine> {
    let store = open_store(db_path)?;
    let config = load_config(config_path)?;
    BehaviorEngine::from_config(Arc::new(store), &config).context("Failed to build engine")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let store = open_store(db_path)?;
    let models = store.count().context("Failed to count models")?;
    println!("   Behavior models: {}", models);

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Ingest transactions: steady ingest --file transactions.csv");
    println!("  2. View insights: steady insights --user 1");
    println!("  3. Start the API: steady serve");

    Ok(())
}

pub fn cmd_users(db_path: &Path) -> Result<()> {
    let store = open_store(db_path)?;
    let users = store.user_ids().context("Failed to list users")?;

    if users.is_empty() {
        println!("No behavior models yet. Ingest transactions with:");
        println!("  steady ingest --file transactions.csv");
        return Ok(());
    }

    println!();
    println!("👤 Users ({})", users.len());
    println!("   ─────────────────────────────");
    for user_id in users {
        println!("   {}", user_id);
    }

    Ok(())
}

pub fn cmd_config(config_path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        match default_config_path() {
            Some(path) => {
                let status = if path.exists() { "present" } else { "not created" };
                println!("{} ({})", path.display(), status);
            }
            None => println!("No data directory available on this platform"),
        }
        return Ok(());
    }

    let config = load_config(config_path)?;
    let rendered = config
        .to_toml_string()
        .context("Failed to render configuration")?;
    print!("{}", rendered);

    Ok(())
}
