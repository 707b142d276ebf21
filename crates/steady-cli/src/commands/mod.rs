//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, config, users and shared utilities (open_store, open_engine)
//! - `ingest` - CSV ingestion into behavior models
//! - `insights` - Insights, model dump and reset
//! - `serve` - Web server command

pub mod core;
pub mod ingest;
pub mod insights;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use ingest::*;
pub use insights::*;
pub use serve::*;
