//! Spending analyzer
//!
//! Per-category monthly aggregation plus the scores derived from it:
//! reliability (how predictable a category is month to month), elasticity
//! (how compressible it is), and the user-wide impulse score.

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::TransactionClassifier;
use crate::config::Configuration;
use crate::models::{
    BehaviorModel, CategoryStats, Confidence, FlexibilityLevel, MonthKey, Transaction,
};
use crate::stats::bucket_add;

/// Impulse-spending risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpulseLevel {
    Low,
    Moderate,
    High,
}

impl ImpulseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpulseLevel::Low => "low",
            ImpulseLevel::Moderate => "moderate",
            ImpulseLevel::High => "high",
        }
    }

    pub fn from_score(score: f64, config: &Configuration) -> Self {
        if score > config.impulse_high_threshold {
            ImpulseLevel::High
        } else if score > config.impulse_moderate_threshold {
            ImpulseLevel::Moderate
        } else {
            ImpulseLevel::Low
        }
    }
}

impl fmt::Display for ImpulseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FlexibilityLevel {
    pub fn from_elasticity(elasticity: f64, config: &Configuration) -> Self {
        if elasticity >= config.flexibility_high_threshold {
            FlexibilityLevel::High
        } else if elasticity <= config.flexibility_low_threshold {
            FlexibilityLevel::Low
        } else {
            FlexibilityLevel::Moderate
        }
    }
}

/// `1 - cv` of monthly totals, clamped to [0, 1]
pub fn reliability_score(stats: &CategoryStats) -> f64 {
    (1.0 - stats.accumulator.coefficient_of_variation()).clamp(0.0, 1.0)
}

/// Blend of the discretionary share and month-to-month unpredictability
pub fn elasticity(stats: &CategoryStats, config: &Configuration) -> f64 {
    let w = config.elasticity_discretionary_weight;
    let score = w * stats.discretionary_ratio() + (1.0 - w) * (1.0 - stats.reliability_score);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// High when both volume and coverage thresholds are met, moderate when one is
pub fn confidence(
    transaction_count: u64,
    coverage_months: u32,
    config: &Configuration,
) -> Confidence {
    let enough_transactions = transaction_count >= config.data_quality_high_transactions;
    let enough_months = coverage_months >= config.data_quality_high_months;
    match (enough_transactions, enough_months) {
        (true, true) => Confidence::High,
        (true, false) | (false, true) => Confidence::Moderate,
        (false, false) => Confidence::Low,
    }
}

/// Recompute coverage and confidence from the model's counters
pub fn refresh_data_quality(model: &mut BehaviorModel, config: &Configuration) {
    let coverage_months = model.active_months.len() as u32;
    let transaction_count = model.data_quality.transaction_count;
    model.data_quality.coverage_months = coverage_months;
    model.data_quality.confidence = confidence(transaction_count, coverage_months, config);
}

/// Folds debit transactions into a user's category stats
pub struct SpendingAnalyzer<'a> {
    config: &'a Configuration,
    classifier: &'a dyn TransactionClassifier,
}

impl<'a> SpendingAnalyzer<'a> {
    pub fn new(config: &'a Configuration, classifier: &'a dyn TransactionClassifier) -> Self {
        Self { config, classifier }
    }

    /// Record one validated debit
    pub fn record(
        &self,
        model: &mut BehaviorModel,
        tx: &Transaction,
        amount: f64,
        ts: DateTime<Utc>,
    ) {
        let key = tx.category_key();
        let discretionary = self.classifier.is_discretionary(tx, &key);
        // Judge against history before this purchase joins it
        let unplanned = discretionary
            && self
                .classifier
                .is_unplanned(tx, amount, model.categories.get(&key));

        let stats = model
            .categories
            .entry(key.clone())
            .or_insert_with(|| CategoryStats::new(amount));

        bucket_add(
            &mut stats.accumulator,
            &mut stats.monthly_totals,
            MonthKey::from_datetime(&ts),
            amount,
        );
        stats.transaction_amounts.ingest(amount);
        stats.min_amount = stats.min_amount.min(amount);
        stats.max_amount = stats.max_amount.max(amount);
        stats.transaction_count += 1;
        if discretionary {
            stats.discretionary_count += 1;
        }

        let per_tx = &stats.transaction_amounts;
        let candidate = (per_tx.mean() - 1.5 * per_tx.std_dev()).max(0.0);
        stats.baseline = stats.baseline.min(candidate);

        stats.reliability_score = reliability_score(stats);
        stats.elasticity = elasticity(stats, self.config);
        stats.flexibility_level = FlexibilityLevel::from_elasticity(stats.elasticity, self.config);

        if discretionary {
            model.impulse.discretionary_count += 1;
            if unplanned {
                model.impulse.unplanned_count += 1;
            }
        }

        model.habits.hourly[ts.hour() as usize] += 1;
        model.habits.weekday[ts.weekday().num_days_from_monday() as usize] += 1;

        debug!(
            tx_id = tx.id,
            category = %key,
            amount,
            discretionary,
            unplanned,
            "Folded spending transaction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierConfig, KeywordClassifier};
    use crate::models::Direction;
    use chrono::TimeZone;

    fn debit(id: i64, amount: f64, category: &str, ts: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            amount: Some(amount),
            direction: Direction::Debit,
            category: Some(category.to_string()),
            merchant: None,
            source: None,
            timestamp: Some(ts),
        }
    }

    fn at(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, h, 0, 0).unwrap()
    }

    fn fold(txs: &[Transaction], config: &Configuration) -> BehaviorModel {
        let classifier = KeywordClassifier::new(&ClassifierConfig::default()).unwrap();
        let analyzer = SpendingAnalyzer::new(config, &classifier);
        let mut model = BehaviorModel::new(1, at(1, 1, 0));
        for tx in txs {
            let (amount, ts) = tx.validated().unwrap();
            analyzer.record(&mut model, tx, amount, ts);
        }
        model
    }

    #[test]
    fn test_rent_is_reliable_and_inflexible() {
        let config = Configuration::default();
        let txs: Vec<Transaction> = (1..=4)
            .map(|m| debit(m as i64, 1500.0, "housing", at(m, 1, 9)))
            .collect();
        let model = fold(&txs, &config);
        let rent = &model.categories["HOUSING"];

        assert_eq!(rent.accumulator.count, 4);
        assert_eq!(rent.reliability_score, 1.0);
        assert_eq!(rent.elasticity, 0.0);
        assert_eq!(rent.flexibility_level, FlexibilityLevel::Low);
        assert_eq!(rent.baseline, 1500.0);
        assert_eq!(model.impulse.discretionary_count, 0);
    }

    #[test]
    fn test_discretionary_category_is_flexible() {
        let config = Configuration::default();
        let txs = vec![
            debit(1, 40.0, "Dining", at(1, 3, 19)),
            debit(2, 60.0, "Dining", at(1, 17, 20)),
            debit(3, 45.0, "Dining", at(2, 8, 19)),
            debit(4, 80.0, "Dining", at(3, 2, 21)),
        ];
        let model = fold(&txs, &config);
        let dining = &model.categories["DINING"];

        assert_eq!(dining.transaction_count, 4);
        assert_eq!(dining.discretionary_ratio(), 1.0);
        assert_eq!(dining.monthly_totals.len(), 3);
        // Full discretionary weight alone clears the high band
        assert!(dining.elasticity >= 0.7);
        assert_eq!(dining.flexibility_level, FlexibilityLevel::High);
        assert_eq!(dining.min_amount, 40.0);
        assert_eq!(dining.max_amount, 80.0);
    }

    #[test]
    fn test_missing_category_is_uncategorized() {
        let config = Configuration::default();
        let mut tx = debit(1, 12.0, "x", at(1, 5, 8));
        tx.category = None;
        let model = fold(&[tx], &config);
        assert!(model.categories.contains_key(crate::models::UNCATEGORIZED));
    }

    #[test]
    fn test_unplanned_purchase_counts_toward_impulse() {
        let config = Configuration::default();
        let txs = vec![
            debit(1, 30.0, "shopping", at(1, 2, 12)),
            debit(2, 35.0, "shopping", at(1, 9, 12)),
            debit(3, 40.0, "shopping", at(1, 16, 12)),
            debit(4, 400.0, "shopping", at(1, 23, 23)),
        ];
        let model = fold(&txs, &config);

        assert_eq!(model.impulse.discretionary_count, 4);
        assert_eq!(model.impulse.unplanned_count, 1);
        assert!((model.impulse.score() - 0.25).abs() < 1e-12);
        assert_eq!(
            ImpulseLevel::from_score(model.impulse.score(), &config),
            ImpulseLevel::Low
        );
    }

    #[test]
    fn test_baseline_is_running_minimum() {
        let config = Configuration::default();
        let txs = vec![
            debit(1, 100.0, "groceries", at(1, 1, 10)),
            debit(2, 20.0, "groceries", at(1, 8, 10)),
            debit(3, 100.0, "groceries", at(1, 15, 10)),
        ];
        let model = fold(&txs, &config);
        // After two transactions mean 60, std ~56.6: clamps to zero and stays there
        assert_eq!(model.categories["GROCERIES"].baseline, 0.0);
    }

    #[test]
    fn test_habits_histograms() {
        let config = Configuration::default();
        // 2025-01-06 is a Monday
        let txs = vec![
            debit(1, 10.0, "dining", at(1, 6, 19)),
            debit(2, 10.0, "dining", at(1, 7, 19)),
            debit(3, 10.0, "dining", at(1, 13, 8)),
        ];
        let model = fold(&txs, &config);
        assert_eq!(model.habits.hourly[19], 2);
        assert_eq!(model.habits.weekday[0], 2);
        assert_eq!(model.habits.peak_hour(), Some(19));
        assert_eq!(model.habits.peak_weekday(), Some(chrono::Weekday::Mon));
    }

    #[test]
    fn test_impulse_bands() {
        let config = Configuration::default();
        assert_eq!(ImpulseLevel::from_score(0.71, &config), ImpulseLevel::High);
        assert_eq!(ImpulseLevel::from_score(0.7, &config), ImpulseLevel::Moderate);
        assert_eq!(ImpulseLevel::from_score(0.3, &config), ImpulseLevel::Low);
    }

    #[test]
    fn test_confidence_levels() {
        let config = Configuration::default();
        assert_eq!(confidence(100, 3, &config), Confidence::High);
        assert_eq!(confidence(150, 1, &config), Confidence::Moderate);
        assert_eq!(confidence(10, 6, &config), Confidence::Moderate);
        assert_eq!(confidence(10, 1, &config), Confidence::Low);
    }

    #[test]
    fn test_flexibility_bands_are_inclusive() {
        let config = Configuration::default();
        assert_eq!(
            FlexibilityLevel::from_elasticity(0.6, &config),
            FlexibilityLevel::High
        );
        assert_eq!(
            FlexibilityLevel::from_elasticity(0.2, &config),
            FlexibilityLevel::Low
        );
        assert_eq!(
            FlexibilityLevel::from_elasticity(0.4, &config),
            FlexibilityLevel::Moderate
        );
    }
}
