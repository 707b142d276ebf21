//! Domain models for Steady
//!
//! `Transaction` is the read-only input record. Everything else here is part of
//! the per-user `BehaviorModel`, the aggregate that the analyzers fold
//! transactions into and that the storage layer persists as one snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::stats::StreamAccumulator;

/// Category key used for debits that arrive without a category
pub const UNCATEGORIZED: &str = "UNCATEGORIZED";

/// Money direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" | "dr" => Ok(Self::Debit),
            "credit" | "cr" => Ok(Self::Credit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified transaction as delivered by the transaction store
///
/// `amount` and `timestamp` are optional so that malformed upstream records can
/// be represented; the engine skips them and counts them against data quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub amount: Option<f64>,
    pub direction: Direction,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    /// Payer/client identity for credits
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Amount and timestamp when the record is usable
    pub fn validated(&self) -> Option<(f64, DateTime<Utc>)> {
        match (self.amount, self.timestamp) {
            (Some(amount), Some(ts)) if amount.is_finite() && amount > 0.0 => Some((amount, ts)),
            _ => None,
        }
    }

    /// Category key for spending aggregation
    pub fn category_key(&self) -> String {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| UNCATEGORIZED.to_string())
    }

    /// Payer identity for income aggregation (source, then merchant)
    pub fn payer(&self) -> String {
        self.source
            .as_deref()
            .or(self.merchant.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown Source")
            .to_string()
    }
}

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_datetime(ts: &DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Running month index, useful for distances between months
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Whole months from `self` to `later` (negative if `later` is earlier)
    pub fn months_until(&self, later: &MonthKey) -> i64 {
        later.ordinal() - self.ordinal()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid month key: {}", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid year in month key: {}", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month in month key: {}", s))?;
        MonthKey::new(year, month).ok_or_else(|| format!("Month out of range: {}", s))
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Business vs personal income, as decided by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomeClass {
    Business,
    Personal,
}

impl IncomeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Personal => "personal",
        }
    }
}

impl fmt::Display for IncomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-payer income totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub count: u64,
    pub total: f64,
    pub classification: IncomeClass,
}

/// Income stream aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStats {
    /// One observation per calendar month: that month's total income
    pub accumulator: StreamAccumulator,
    pub monthly_totals: BTreeMap<MonthKey, f64>,
    /// Smallest single income transaction
    pub min: f64,
    /// Largest single income transaction
    pub max: f64,
    /// Number of income transactions (not months)
    pub count: u64,
    pub total: f64,
    pub business_total: f64,
    pub personal_total: f64,
    pub sources: BTreeMap<String, SourceStats>,
    /// Most recent payment timestamps, sorted ascending
    pub recent_payments: Vec<DateTime<Utc>>,
    pub first_payment_at: DateTime<Utc>,
    pub last_payment_at: DateTime<Utc>,
}

impl IncomeStats {
    /// Gaps in days between consecutive recent payments
    pub fn frequency_days(&self) -> Vec<f64> {
        self.recent_payments
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64 / 86_400.0)
            .collect()
    }

    /// Month-to-month coefficient of variation (0 when the mean is 0)
    pub fn volatility_coefficient(&self) -> f64 {
        self.accumulator.coefficient_of_variation()
    }

    pub fn mean_monthly(&self) -> f64 {
        self.accumulator.mean()
    }
}

/// Spending flexibility band derived from elasticity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlexibilityLevel {
    Low,
    Moderate,
    High,
}

impl FlexibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl fmt::Display for FlexibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spending aggregate for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// One observation per calendar month: that month's category total
    pub accumulator: StreamAccumulator,
    pub monthly_totals: BTreeMap<MonthKey, f64>,
    /// Per-transaction amounts, used for the amount envelope
    pub transaction_amounts: StreamAccumulator,
    pub min_amount: f64,
    pub max_amount: f64,
    pub reliability_score: f64,
    pub elasticity: f64,
    pub flexibility_level: FlexibilityLevel,
    pub transaction_count: u64,
    pub discretionary_count: u64,
    /// Lowest observed `max(0, mean - 1.5 * std_dev)` of transaction amounts
    pub baseline: f64,
}

impl CategoryStats {
    pub fn new(amount: f64) -> Self {
        Self {
            accumulator: StreamAccumulator::new(),
            monthly_totals: BTreeMap::new(),
            transaction_amounts: StreamAccumulator::new(),
            min_amount: amount,
            max_amount: amount,
            reliability_score: 1.0,
            elasticity: 0.0,
            flexibility_level: FlexibilityLevel::Low,
            transaction_count: 0,
            discretionary_count: 0,
            baseline: f64::MAX,
        }
    }

    pub fn monthly_average(&self) -> f64 {
        self.accumulator.mean()
    }

    /// Share of this category's transactions tagged discretionary
    pub fn discretionary_ratio(&self) -> f64 {
        if self.transaction_count == 0 {
            0.0
        } else {
            self.discretionary_count as f64 / self.transaction_count as f64
        }
    }
}

/// Counts behind the impulse score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpulseStats {
    pub discretionary_count: u64,
    pub unplanned_count: u64,
}

impl ImpulseStats {
    /// Fraction of discretionary transactions flagged unplanned
    pub fn score(&self) -> f64 {
        if self.discretionary_count == 0 {
            0.0
        } else {
            (self.unplanned_count as f64 / self.discretionary_count as f64).clamp(0.0, 1.0)
        }
    }
}

/// When spending happens (UTC hour-of-day and weekday histograms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingHabits {
    pub hourly: Vec<u64>,
    /// Monday = 0
    pub weekday: Vec<u64>,
}

impl Default for SpendingHabits {
    fn default() -> Self {
        Self {
            hourly: vec![0; 24],
            weekday: vec![0; 7],
        }
    }
}

impl SpendingHabits {
    pub fn peak_hour(&self) -> Option<u32> {
        peak_index(&self.hourly)
    }

    pub fn peak_weekday(&self) -> Option<chrono::Weekday> {
        use chrono::Weekday::*;
        const DAYS: [chrono::Weekday; 7] = [Mon, Tue, Wed, Thu, Fri, Sat, Sun];
        peak_index(&self.weekday).and_then(|i| DAYS.get(i as usize).copied())
    }
}

fn peak_index(counts: &[u64]) -> Option<u32> {
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        // max_by_key returns the last maximum; reverse so ties go to the earliest slot
        .rev()
        .max_by_key(|(_, c)| **c)
        .map(|(i, _)| i as u32)
}

/// How much to trust the model's derived numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Moderate,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Valid transactions folded into the model
    pub transaction_count: u64,
    /// Malformed transactions that were skipped
    pub skipped_count: u64,
    pub coverage_months: u32,
    pub confidence: Confidence,
}

impl Default for DataQuality {
    fn default() -> Self {
        Self {
            transaction_count: 0,
            skipped_count: 0,
            coverage_months: 0,
            confidence: Confidence::Low,
        }
    }
}

/// Per-user aggregate of every incremental statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorModel {
    pub user_id: i64,
    pub income: Option<IncomeStats>,
    pub categories: BTreeMap<String, CategoryStats>,
    pub impulse: ImpulseStats,
    pub habits: SpendingHabits,
    pub data_quality: DataQuality,
    /// Months with at least one valid transaction
    pub active_months: BTreeSet<MonthKey>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl BehaviorModel {
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            income: None,
            categories: BTreeMap::new(),
            impulse: ImpulseStats::default(),
            habits: SpendingHabits::default(),
            data_quality: DataQuality::default(),
            active_months: BTreeSet::new(),
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Sum of per-category average monthly spend
    pub fn monthly_spending_average(&self) -> f64 {
        self.categories.values().map(|c| c.monthly_average()).sum()
    }
}
