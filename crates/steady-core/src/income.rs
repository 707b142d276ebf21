//! Income analyzer
//!
//! Folds credit transactions into `IncomeStats` and derives the income
//! analysis block (volatility, payment frequency, emergency-fund sizing).
//!
//! Volatility is measured over calendar-month totals, never per-transaction
//! amounts, so one large invoice does not look like an unstable income.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::TransactionClassifier;
use crate::config::Configuration;
use crate::models::{IncomeClass, IncomeStats, MonthKey, SourceStats, Transaction};
use crate::stats::{bucket_add, decay_weight, round2, StreamAccumulator};

/// Income volatility tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityLevel {
    Stable,
    Moderate,
    High,
}

impl VolatilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityLevel::Stable => "stable",
            VolatilityLevel::Moderate => "moderate",
            VolatilityLevel::High => "high",
        }
    }

    /// Classify a coefficient of variation against the configured bands
    pub fn from_coefficient(cv: f64, config: &Configuration) -> Self {
        if cv > config.volatility_high {
            VolatilityLevel::High
        } else if cv > config.volatility_moderate {
            VolatilityLevel::Moderate
        } else {
            VolatilityLevel::Stable
        }
    }
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VolatilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(VolatilityLevel::Stable),
            "moderate" => Ok(VolatilityLevel::Moderate),
            "high" => Ok(VolatilityLevel::High),
            _ => Err(format!("Unknown volatility level: {}", s)),
        }
    }
}

impl IncomeStats {
    pub(crate) fn start(amount: f64, ts: DateTime<Utc>) -> Self {
        Self {
            accumulator: StreamAccumulator::new(),
            monthly_totals: Default::default(),
            min: amount,
            max: amount,
            count: 0,
            total: 0.0,
            business_total: 0.0,
            personal_total: 0.0,
            sources: Default::default(),
            recent_payments: Vec::new(),
            first_payment_at: ts,
            last_payment_at: ts,
        }
    }

    pub fn is_gig_worker(&self, config: &Configuration) -> bool {
        self.volatility_coefficient() > config.gig_worker_threshold
    }

    pub fn volatility_level(&self, config: &Configuration) -> VolatilityLevel {
        VolatilityLevel::from_coefficient(self.volatility_coefficient(), config)
    }

    /// Whether enough history exists to report on
    pub fn has_sufficient_window(&self, config: &Configuration) -> bool {
        self.last_payment_at - self.first_payment_at
            >= Duration::days(config.min_income_window_days as i64)
    }

    /// Mean of monthly totals with older months down-weighted by half-life decay
    pub fn recency_weighted_average(&self, half_life_months: f64) -> f64 {
        let Some(latest) = self.monthly_totals.keys().next_back().copied() else {
            return 0.0;
        };
        let mut acc = StreamAccumulator::new();
        for (month, total) in &self.monthly_totals {
            let age = month.months_until(&latest) as f64;
            // Extremely old months underflow to zero weight and are rejected
            acc.ingest_weighted(*total, decay_weight(age, half_life_months))
                .ok();
        }
        acc.mean()
    }
}

/// Folds credit transactions into a user's income stats
pub struct IncomeAnalyzer<'a> {
    config: &'a Configuration,
    classifier: &'a dyn TransactionClassifier,
}

impl<'a> IncomeAnalyzer<'a> {
    pub fn new(config: &'a Configuration, classifier: &'a dyn TransactionClassifier) -> Self {
        Self { config, classifier }
    }

    /// Record one validated credit
    pub fn record(
        &self,
        income: &mut Option<IncomeStats>,
        tx: &Transaction,
        amount: f64,
        ts: DateTime<Utc>,
    ) {
        let stats = income.get_or_insert_with(|| IncomeStats::start(amount, ts));

        bucket_add(
            &mut stats.accumulator,
            &mut stats.monthly_totals,
            MonthKey::from_datetime(&ts),
            amount,
        );

        stats.min = stats.min.min(amount);
        stats.max = stats.max.max(amount);
        stats.count += 1;
        stats.total += amount;

        let class = self.classifier.income_class(tx);
        match class {
            IncomeClass::Business => stats.business_total += amount,
            IncomeClass::Personal => stats.personal_total += amount,
        }

        let source = stats.sources.entry(tx.payer()).or_insert(SourceStats {
            count: 0,
            total: 0.0,
            classification: class,
        });
        source.count += 1;
        source.total += amount;

        self.record_payment_time(stats, ts);

        debug!(
            tx_id = tx.id,
            amount,
            class = %class,
            months = stats.monthly_totals.len(),
            "Folded income transaction"
        );
    }

    /// Count an active month without credits as a zero-income month
    ///
    /// No-op before the first credit, or when the month already has a bucket.
    pub fn record_idle_month(&self, income: &mut Option<IncomeStats>, month: MonthKey) {
        let Some(stats) = income else {
            return;
        };
        if stats.monthly_totals.contains_key(&month) {
            return;
        }
        bucket_add(
            &mut stats.accumulator,
            &mut stats.monthly_totals,
            month,
            0.0,
        );
        debug!(%month, "Recorded zero-income month");
    }

    /// Insert into the sorted window, keeping only the most recent payments
    fn record_payment_time(&self, stats: &mut IncomeStats, ts: DateTime<Utc>) {
        let pos = stats.recent_payments.partition_point(|t| *t <= ts);
        stats.recent_payments.insert(pos, ts);
        let keep = self.config.payment_history_window + 1;
        if stats.recent_payments.len() > keep {
            let excess = stats.recent_payments.len() - keep;
            stats.recent_payments.drain(..excess);
        }

        if ts < stats.first_payment_at {
            stats.first_payment_at = ts;
        }
        if ts > stats.last_payment_at {
            stats.last_payment_at = ts;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFrequency {
    /// Payments in the frequency window
    pub count: usize,
    pub avg_days_between: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyFund {
    pub months: u32,
    pub amount: f64,
    pub reason: String,
}

/// Client concentration and income mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAnalysis {
    pub source_count: usize,
    pub top_source: Option<String>,
    /// Share of total income from the largest payer
    pub top_source_share: f64,
    pub business_total: f64,
    pub personal_total: f64,
}

/// Income analysis block of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeAnalysis {
    pub average_monthly: f64,
    pub volatility: f64,
    pub volatility_level: VolatilityLevel,
    pub income_range: IncomeRange,
    pub payment_frequency: PaymentFrequency,
    pub recommended_emergency_fund: EmergencyFund,
    pub is_gig_worker: bool,
    pub good_month_threshold: f64,
    pub lean_month_threshold: f64,
    pub sources: SourceAnalysis,
    pub recent_weighted_average: f64,
}

fn emergency_fund_reason(level: VolatilityLevel, cv: f64, months: u32) -> String {
    let pct = (cv * 100.0).round();
    match level {
        VolatilityLevel::High => format!(
            "High income volatility ({}%): keep {} months of income in reserve",
            pct, months
        ),
        VolatilityLevel::Moderate => format!(
            "Moderate income volatility ({}%): keep {} months of income in reserve",
            pct, months
        ),
        VolatilityLevel::Stable => format!(
            "Stable income ({}% volatility): {} months of income covers typical shortfalls",
            pct, months
        ),
    }
}

fn analyze_sources(stats: &IncomeStats) -> SourceAnalysis {
    // Ties resolve to the alphabetically first payer
    let top = stats
        .sources
        .iter()
        .rev()
        .max_by(|a, b| a.1.total.total_cmp(&b.1.total));
    let top_source_share = match top {
        Some((_, s)) if stats.total > 0.0 => s.total / stats.total,
        _ => 0.0,
    };
    SourceAnalysis {
        source_count: stats.sources.len(),
        top_source: top.map(|(name, _)| name.clone()),
        top_source_share: round2(top_source_share),
        business_total: round2(stats.business_total),
        personal_total: round2(stats.personal_total),
    }
}

/// Derive the income analysis block
///
/// Returns `None` while there is no income or the payment history spans less
/// than `min_income_window_days`.
pub fn analyze(income: Option<&IncomeStats>, config: &Configuration) -> Option<IncomeAnalysis> {
    let stats = income?;
    if stats.count == 0 || !stats.has_sufficient_window(config) {
        return None;
    }

    let mean = stats.mean_monthly();
    let cv = stats.volatility_coefficient();
    let level = VolatilityLevel::from_coefficient(cv, config);
    let months = config.emergency_fund_months(level);

    let gaps = stats.frequency_days();
    let avg_days_between = if gaps.is_empty() {
        0.0
    } else {
        gaps.iter().sum::<f64>() / gaps.len() as f64
    };

    Some(IncomeAnalysis {
        average_monthly: round2(mean),
        volatility: (cv * 10_000.0).round() / 10_000.0,
        volatility_level: level,
        income_range: IncomeRange {
            min: round2(stats.min),
            max: round2(stats.max),
        },
        payment_frequency: PaymentFrequency {
            count: gaps.len() + 1,
            avg_days_between: round2(avg_days_between),
        },
        recommended_emergency_fund: EmergencyFund {
            months,
            amount: round2(months as f64 * mean),
            reason: emergency_fund_reason(level, cv, months),
        },
        is_gig_worker: stats.is_gig_worker(config),
        good_month_threshold: round2(mean * config.good_month_multiplier),
        lean_month_threshold: round2(mean * config.lean_month_multiplier),
        sources: analyze_sources(stats),
        recent_weighted_average: round2(
            stats.recency_weighted_average(config.decay_half_life_months),
        ),
    })
}
