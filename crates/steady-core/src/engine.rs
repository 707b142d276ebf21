//! Behavior engine: ingestion and the read path
//!
//! Ingestion is optimistic. For each user in a batch the engine loads the
//! current snapshot and its version, folds that user's transactions in one
//! pass, then compare-and-swaps. If another writer committed in between, it
//! reloads and refolds, up to `max_write_retries` attempts.
//!
//! Reads never lock: insights are formatted from whatever snapshot the store
//! returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{KeywordClassifier, TransactionClassifier};
use crate::config::{Configuration, SteadyConfig};
use crate::error::{Error, Result};
use crate::income::IncomeAnalyzer;
use crate::insights::{format_insights, DashboardInsights};
use crate::models::{BehaviorModel, Direction, MonthKey, Transaction};
use crate::spending::{refresh_data_quality, SpendingAnalyzer};
use crate::store::{BehaviorStore, VersionedModel};

/// What one fold did to a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldOutcome {
    pub applied: u64,
    pub skipped: u64,
}

/// Fold transactions into a model in memory
///
/// Malformed transactions (missing or non-positive amount, missing timestamp)
/// are skipped and counted in `data_quality.skipped_count`.
///
/// Once a user has any income, every active month is an income observation:
/// months with spending but no credits count as zero-income months.
pub fn fold_transactions(
    model: &mut BehaviorModel,
    txs: &[&Transaction],
    config: &Configuration,
    classifier: &dyn TransactionClassifier,
) -> FoldOutcome {
    let income = IncomeAnalyzer::new(config, classifier);
    let spending = SpendingAnalyzer::new(config, classifier);
    let mut outcome = FoldOutcome::default();

    for tx in txs {
        let Some((amount, ts)) = tx.validated() else {
            warn!(
                tx_id = tx.id,
                user_id = tx.user_id,
                "Skipping malformed transaction"
            );
            outcome.skipped += 1;
            continue;
        };

        let month = MonthKey::from_datetime(&ts);
        let new_month = model.active_months.insert(month);
        model.data_quality.transaction_count += 1;
        match tx.direction {
            Direction::Credit => {
                let first_credit = model.income.is_none();
                income.record(&mut model.income, tx, amount, ts);
                if first_credit {
                    for idle in &model.active_months {
                        income.record_idle_month(&mut model.income, *idle);
                    }
                }
            }
            Direction::Debit => {
                if new_month {
                    income.record_idle_month(&mut model.income, month);
                }
                spending.record(model, tx, amount, ts);
            }
        }
        outcome.applied += 1;
    }

    model.data_quality.skipped_count += outcome.skipped;
    refresh_data_quality(model, config);
    model.last_updated_at = Utc::now();
    outcome
}

/// Summary of an ingest call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Distinct users in the batch
    pub users: usize,
    pub applied: u64,
    pub skipped: u64,
    /// Compare-and-swap attempts that lost to another writer
    pub conflicts: u32,
}

pub struct BehaviorEngine {
    store: Arc<dyn BehaviorStore>,
    classifier: Arc<dyn TransactionClassifier>,
    config: Configuration,
}

impl BehaviorEngine {
    pub fn new(
        store: Arc<dyn BehaviorStore>,
        classifier: Arc<dyn TransactionClassifier>,
        config: Configuration,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Engine with the keyword classifier described by `config`
    pub fn from_config(store: Arc<dyn BehaviorStore>, config: &SteadyConfig) -> Result<Self> {
        let classifier = KeywordClassifier::new(&config.classifier)?;
        Ok(Self::new(
            store,
            Arc::new(classifier),
            config.thresholds.clone(),
        ))
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BehaviorStore> {
        &self.store
    }

    /// Ingest a single transaction
    pub fn ingest(&self, tx: &Transaction) -> Result<IngestReport> {
        self.ingest_batch(std::slice::from_ref(tx))
    }

    /// Ingest a batch: one load/fold/swap cycle per user
    ///
    /// Users are processed in ascending id order. If a user exhausts the retry
    /// budget the call fails with `ConcurrencyConflict`; users before it in the
    /// batch stay committed.
    pub fn ingest_batch(&self, txs: &[Transaction]) -> Result<IngestReport> {
        let mut by_user: BTreeMap<i64, Vec<&Transaction>> = BTreeMap::new();
        for tx in txs {
            by_user.entry(tx.user_id).or_default().push(tx);
        }

        let mut report = IngestReport {
            users: by_user.len(),
            ..Default::default()
        };
        for (user_id, user_txs) in &by_user {
            let (outcome, conflicts) = self.ingest_user(*user_id, user_txs)?;
            report.applied += outcome.applied;
            report.skipped += outcome.skipped;
            report.conflicts += conflicts;
        }

        Ok(report)
    }

    fn ingest_user(&self, user_id: i64, txs: &[&Transaction]) -> Result<(FoldOutcome, u32)> {
        let max_attempts = self.config.max_write_retries;
        let mut conflicts = 0;

        for attempt in 1..=max_attempts {
            let (mut model, expected) = match self.store.load(user_id)? {
                Some(VersionedModel { model, version }) => (model, Some(version)),
                None => (BehaviorModel::new(user_id, Utc::now()), None),
            };

            let outcome = fold_transactions(&mut model, txs, &self.config, self.classifier.as_ref());

            // Models are created by the first valid transaction, not by junk
            if expected.is_none() && outcome.applied == 0 {
                debug!(user_id, skipped = outcome.skipped, "No valid transactions for new user");
                return Ok((outcome, conflicts));
            }

            if self.store.compare_and_swap(&model, expected)? {
                info!(
                    user_id,
                    applied = outcome.applied,
                    skipped = outcome.skipped,
                    attempt,
                    "Committed behavior model"
                );
                return Ok((outcome, conflicts));
            }

            conflicts += 1;
            warn!(user_id, attempt, max_attempts, "Behavior model write conflict");
        }

        Err(Error::ConcurrencyConflict {
            user_id,
            attempts: max_attempts,
        })
    }

    /// Current snapshot, if the user has one
    pub fn model(&self, user_id: i64) -> Result<Option<VersionedModel>> {
        self.store.load(user_id)
    }

    /// Dashboard insights for a user
    ///
    /// A user with no model gets the insights of an empty model: every derived
    /// block is empty and `income_analysis` is `None`.
    pub fn insights(&self, user_id: i64) -> Result<DashboardInsights> {
        let model = match self.store.load(user_id)? {
            Some(snapshot) => snapshot.model,
            None => BehaviorModel::new(user_id, Utc::now()),
        };
        Ok(format_insights(&model, &self.config))
    }

    /// Forget a user's model
    pub fn reset(&self, user_id: i64) -> Result<bool> {
        let deleted = self.store.delete(user_id)?;
        if deleted {
            info!(user_id, "Deleted behavior model");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IncomeClass;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ts(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, 10, 0, 0).unwrap()
    }

    fn tx(id: i64, user_id: i64, amount: Option<f64>, direction: Direction) -> Transaction {
        Transaction {
            id,
            user_id,
            amount,
            direction,
            category: Some("groceries".to_string()),
            merchant: Some("Market".to_string()),
            source: None,
            timestamp: Some(ts(1, (id as u32 % 28) + 1)),
        }
    }

    fn engine_with(store: Arc<dyn BehaviorStore>) -> BehaviorEngine {
        BehaviorEngine::from_config(store, &SteadyConfig::default()).unwrap()
    }

    #[test]
    fn test_batch_groups_by_user() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let batch = vec![
            tx(1, 1, Some(20.0), Direction::Debit),
            tx(2, 2, Some(30.0), Direction::Debit),
            tx(3, 1, Some(40.0), Direction::Debit),
        ];
        let report = engine.ingest_batch(&batch).unwrap();
        assert_eq!(report.users, 2);
        assert_eq!(report.applied, 3);

        let one = engine.model(1).unwrap().unwrap();
        // Both of user 1's transactions land in a single write
        assert_eq!(one.version, 1);
        assert_eq!(one.model.data_quality.transaction_count, 2);
    }

    #[test]
    fn test_malformed_transactions_are_skipped() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let mut no_ts = tx(3, 1, Some(10.0), Direction::Debit);
        no_ts.timestamp = None;
        let batch = vec![
            tx(1, 1, Some(25.0), Direction::Debit),
            tx(2, 1, None, Direction::Debit),
            no_ts,
            tx(4, 1, Some(-5.0), Direction::Credit),
        ];
        let report = engine.ingest_batch(&batch).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 3);

        let model = engine.model(1).unwrap().unwrap().model;
        assert_eq!(model.data_quality.transaction_count, 1);
        assert_eq!(model.data_quality.skipped_count, 3);
        assert!(model.income.is_none());
    }

    fn dated(id: i64, amount: f64, direction: Direction, m: u32) -> Transaction {
        Transaction {
            timestamp: Some(ts(m, 5)),
            ..tx(id, 1, Some(amount), direction)
        }
    }

    #[test]
    fn test_months_without_credits_count_as_zero_income() {
        let config = Configuration::default();
        let classifier = KeywordClassifier::new(&Default::default()).unwrap();
        let txs = vec![
            dated(1, 40.0, Direction::Debit, 1),
            dated(2, 2000.0, Direction::Credit, 2),
            dated(3, 40.0, Direction::Debit, 3),
            dated(4, 1000.0, Direction::Credit, 3),
        ];

        // Order must not matter: the spending-only month may come before or
        // after the first credit.
        for order in [txs.iter().collect::<Vec<_>>(), txs.iter().rev().collect()] {
            let mut model = BehaviorModel::new(1, Utc::now());
            fold_transactions(&mut model, &order, &config, &classifier);

            let income = model.income.unwrap();
            let totals: Vec<f64> = income.monthly_totals.values().copied().collect();
            assert_eq!(totals, vec![0.0, 2000.0, 1000.0]);
            assert_eq!(income.accumulator.count, 3);
            assert!((income.mean_monthly() - 1000.0).abs() < 1e-9);
            assert_eq!(income.count, 2);
            assert_eq!(income.min, 1000.0);
        }
    }

    #[test]
    fn test_spending_only_history_has_no_income_buckets() {
        let config = Configuration::default();
        let classifier = KeywordClassifier::new(&Default::default()).unwrap();
        let a = dated(1, 40.0, Direction::Debit, 1);
        let b = dated(2, 60.0, Direction::Debit, 2);
        let mut model = BehaviorModel::new(1, Utc::now());
        fold_transactions(&mut model, &[&a, &b], &config, &classifier);
        assert!(model.income.is_none());
        assert_eq!(model.active_months.len(), 2);
    }

    #[test]
    fn test_only_malformed_does_not_create_model() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let report = engine
            .ingest(&tx(1, 5, None, Direction::Credit))
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(engine.model(5).unwrap().is_none());
    }

    #[test]
    fn test_insights_for_unknown_user() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let insights = engine.insights(99).unwrap();
        assert!(insights.income_analysis.is_none());
        assert_eq!(insights.behavior_summary.transaction_count, 0);
    }

    #[test]
    fn test_reset() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        engine.ingest(&tx(1, 1, Some(5.0), Direction::Debit)).unwrap();
        assert!(engine.reset(1).unwrap());
        assert!(engine.model(1).unwrap().is_none());
        assert!(!engine.reset(1).unwrap());
    }

    /// Store whose swaps fail a fixed number of times before delegating
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
    }

    impl BehaviorStore for FlakyStore {
        fn load(&self, user_id: i64) -> Result<Option<VersionedModel>> {
            self.inner.load(user_id)
        }

        fn compare_and_swap(&self, model: &BehaviorModel, expected: Option<u64>) -> Result<bool> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.compare_and_swap(model, expected)
        }

        fn delete(&self, user_id: i64) -> Result<bool> {
            self.inner.delete(user_id)
        }
    }

    #[test]
    fn test_conflicts_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let engine = engine_with(store);
        let report = engine.ingest(&tx(1, 1, Some(5.0), Direction::Debit)).unwrap();
        assert_eq!(report.conflicts, 2);
        assert_eq!(report.applied, 1);
        // Refolding from a fresh load never double counts
        let model = engine.model(1).unwrap().unwrap().model;
        assert_eq!(model.data_quality.transaction_count, 1);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(100),
        });
        let engine = engine_with(store);
        let err = engine
            .ingest(&tx(1, 7, Some(5.0), Direction::Debit))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConcurrencyConflict {
                user_id: 7,
                attempts: 5
            }
        ));
    }

    struct EverythingIsBusiness;

    impl TransactionClassifier for EverythingIsBusiness {
        fn income_class(&self, _tx: &Transaction) -> IncomeClass {
            IncomeClass::Business
        }

        fn is_discretionary(&self, _tx: &Transaction, _category: &str) -> bool {
            true
        }

        fn is_unplanned(
            &self,
            _tx: &Transaction,
            _amount: f64,
            _history: Option<&crate::models::CategoryStats>,
        ) -> bool {
            true
        }
    }

    #[test]
    fn test_classifier_is_pluggable() {
        let engine = BehaviorEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EverythingIsBusiness),
            Configuration::default(),
        );
        let mut credit = tx(1, 1, Some(100.0), Direction::Credit);
        credit.source = Some("Grandma gift".to_string());
        engine
            .ingest_batch(&[credit, tx(2, 1, Some(10.0), Direction::Debit)])
            .unwrap();

        let model = engine.model(1).unwrap().unwrap().model;
        assert_eq!(model.income.unwrap().business_total, 100.0);
        assert_eq!(model.impulse.unplanned_count, 1);
        assert_eq!(model.categories["GROCERIES"].discretionary_count, 1);
    }
}
