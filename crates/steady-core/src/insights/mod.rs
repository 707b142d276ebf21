//! Insight Formatter - dashboard insights from a behavior model
//!
//! The formatter is a pure function of `(BehaviorModel, Configuration)`. It
//! never touches storage, so it can run on a snapshot while ingestion
//! continues. Derived blocks are `None` until the model has enough data.
//!
//! ## Output
//!
//! - **Behavior summary** - counts, coverage, confidence, per-category scores
//! - **Income analysis** - volatility, payment frequency, emergency fund
//! - **Cash flow** - per-month net flow, lean periods, smoothing plan
//! - **Risk warnings** - sorted high, then warning, then info
//! - **Quick wins** - flexible categories worth trimming, biggest first
//! - **Recommended actions** - good/lean month strategy for gig workers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use steady_core::insights::format_insights;
//!
//! let insights = format_insights(&model, &config);
//! for warning in &insights.risk_warnings {
//!     println!("[{}] {}", warning.severity, warning.message);
//! }
//! ```

mod formatter;
pub mod types;

pub use formatter::format_insights;
pub use types::{
    BehaviorSummary, CategorySummary, DashboardInsights, Difficulty, QuickWin, RiskWarning,
    Severity, WarningKind,
};
