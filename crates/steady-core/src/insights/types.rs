//! Dashboard response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cashflow::CashFlowAnalysis;
use crate::income::IncomeAnalysis;
use crate::models::{Confidence, FlexibilityLevel};
use crate::spending::ImpulseLevel;

/// Severity level of a risk warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational - no action needed
    Info,
    /// Worth attention but not urgent
    Warning,
    /// Should be addressed soon
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::High => "high",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::High => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "high" => Ok(Severity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Condition that triggered a risk warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    IncomeVolatility,
    ImpulseSpending,
    DataQuality,
    /// Average spending outruns average income
    CashFlow,
    /// Too many recent months ended in deficit
    LeanPeriods,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::IncomeVolatility => "income_volatility",
            WarningKind::ImpulseSpending => "impulse_spending",
            WarningKind::DataQuality => "data_quality",
            WarningKind::CashFlow => "cash_flow",
            WarningKind::LeanPeriods => "lean_periods",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

impl RiskWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

/// How hard a quick win is to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// The more flexible a category, the easier it is to trim
    pub fn from_flexibility(level: FlexibilityLevel) -> Self {
        match level {
            FlexibilityLevel::High => Difficulty::Easy,
            FlexibilityLevel::Moderate => Difficulty::Medium,
            FlexibilityLevel::Low => Difficulty::Hard,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete spending cut with its projected savings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickWin {
    pub category: String,
    pub action: String,
    pub monthly_impact: f64,
    pub annual_impact: f64,
    pub difficulty: Difficulty,
    pub current_spending: f64,
    pub new_spending: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub monthly_average: f64,
    pub reliability_score: f64,
    pub elasticity: f64,
    pub flexibility_level: FlexibilityLevel,
    pub transaction_count: u64,
    pub baseline: f64,
}

/// Overview of what the model has learned so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub transaction_count: u64,
    pub skipped_count: u64,
    pub coverage_months: u32,
    pub confidence: Confidence,
    pub impulse_score: f64,
    pub impulse_level: ImpulseLevel,
    pub monthly_spending_average: f64,
    /// Average monthly income over average monthly spending
    pub income_expense_ratio: Option<f64>,
    pub categories: Vec<CategorySummary>,
    /// UTC hour with the most spending transactions
    pub peak_spending_hour: Option<u32>,
    pub peak_spending_day: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

/// Everything the dashboard shows, recomputed on every read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardInsights {
    pub behavior_summary: BehaviorSummary,
    pub income_analysis: Option<IncomeAnalysis>,
    pub cash_flow: Option<CashFlowAnalysis>,
    pub quick_wins: Vec<QuickWin>,
    pub risk_warnings: Vec<RiskWarning>,
    pub recommended_actions: Vec<String>,
}
