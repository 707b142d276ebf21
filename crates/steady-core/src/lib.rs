//! Steady Core Library
//!
//! Income and spending behavior modeling for people with irregular income:
//! - Incremental (Welford) statistics with retraction and decay weights
//! - Per-user behavior model folded from classified transactions
//! - Income analysis: volatility, payment frequency, emergency-fund sizing
//! - Spending analysis: reliability, elasticity, impulse score
//! - Cash-flow analysis: lean periods and income smoothing
//! - Insight formatter producing the dashboard view
//! - Versioned model storage (in-memory and SQLite)
//! - Pluggable transaction classifier
//! - CSV transaction import

pub mod cashflow;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod income;
pub mod insights;
pub mod models;
pub mod spending;
pub mod stats;
pub mod store;

pub use cashflow::CashFlowAnalysis;
pub use classify::{ClassifierConfig, KeywordClassifier, TransactionClassifier};
pub use config::{default_config_path, Configuration, SteadyConfig};
pub use engine::{fold_transactions, BehaviorEngine, FoldOutcome, IngestReport};
pub use error::{Error, Result};
pub use income::{IncomeAnalysis, IncomeAnalyzer, VolatilityLevel};
pub use insights::{format_insights, DashboardInsights};
pub use models::{BehaviorModel, Direction, MonthKey, Transaction};
pub use spending::{ImpulseLevel, SpendingAnalyzer};
pub use stats::StreamAccumulator;
pub use store::{BehaviorStore, MemoryStore, SqliteStore, VersionedModel};
