//! Error types for Steady

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid weight: {0} (weights must be finite and > 0)")]
    InvalidWeight(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Concurrent update conflict for user {user_id} after {attempts} attempts")]
    ConcurrencyConflict { user_id: i64, attempts: u32 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
