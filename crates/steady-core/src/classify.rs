//! Transaction classification policy
//!
//! The analyzers never embed classification heuristics. They ask a
//! `TransactionClassifier` three questions about each transaction:
//! - is this credit business or personal income?
//! - is this debit in a discretionary category?
//! - was this discretionary purchase unplanned?
//!
//! `KeywordClassifier` is the built-in policy, configured from the
//! `[classifier]` section of the config file. Callers with better signals
//! (an ML categorizer, user-confirmed tags) plug in their own implementation.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{CategoryStats, IncomeClass, Transaction};

/// Classification capability injected into the engine
pub trait TransactionClassifier: Send + Sync {
    /// Business vs personal for an income (credit) transaction
    fn income_class(&self, tx: &Transaction) -> IncomeClass;

    /// Whether spending in `category` is discretionary
    fn is_discretionary(&self, tx: &Transaction, category: &str) -> bool;

    /// Whether a discretionary purchase looks unplanned
    ///
    /// `history` is the category's stats before this transaction is folded in.
    fn is_unplanned(&self, tx: &Transaction, amount: f64, history: Option<&CategoryStats>)
        -> bool;
}

/// Settings for `KeywordClassifier`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub business_keywords: Vec<String>,
    pub personal_keywords: Vec<String>,
    /// Category keys (case-insensitive) treated as discretionary
    pub discretionary_categories: Vec<String>,
    /// Standard deviations above the per-transaction mean that mark a purchase unplanned
    pub unplanned_std_devs: f64,
    /// Prior transactions a category needs before the amount envelope applies
    pub unplanned_min_history: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            business_keywords: strings(&[
                "client",
                "project",
                "upwork",
                "fiverr",
                "freelance",
                "consulting",
                "contractor",
                "gig",
                "invoice",
                "payment for",
            ]),
            personal_keywords: strings(&[
                "gift",
                "refund",
                "cashback",
                "bonus",
                "salary",
                "payroll",
                "dividend",
                "interest",
                "tax refund",
            ]),
            discretionary_categories: strings(&[
                "DINING",
                "ENTERTAINMENT",
                "SHOPPING",
                "TRAVEL",
                "SUBSCRIPTIONS",
                "PERSONAL_CARE",
                "HOBBIES",
                "GIFTS",
            ]),
            unplanned_std_devs: 2.0,
            unplanned_min_history: 3,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.unplanned_std_devs.is_finite() || self.unplanned_std_devs < 0.0 {
            return Err(Error::InvalidConfig(
                "unplanned_std_devs must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Compile a keyword list into one case-insensitive alternation
fn keyword_regex(keywords: &[String]) -> Result<Option<Regex>> {
    let escaped: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i)(?:{})", escaped.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| Error::InvalidConfig(format!("Invalid classifier keyword: {}", e)))
}

/// Keyword and amount-envelope classifier
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    business: Option<Regex>,
    personal: Option<Regex>,
    discretionary: HashSet<String>,
    unplanned_std_devs: f64,
    unplanned_min_history: u64,
}

impl KeywordClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            business: keyword_regex(&config.business_keywords)?,
            personal: keyword_regex(&config.personal_keywords)?,
            discretionary: config
                .discretionary_categories
                .iter()
                .map(|c| c.trim().to_uppercase())
                .collect(),
            unplanned_std_devs: config.unplanned_std_devs,
            unplanned_min_history: config.unplanned_min_history,
        })
    }

    fn matches(re: &Option<Regex>, haystack: &str) -> bool {
        re.as_ref().is_some_and(|r| r.is_match(haystack))
    }
}

impl TransactionClassifier for KeywordClassifier {
    fn income_class(&self, tx: &Transaction) -> IncomeClass {
        let haystack = [
            tx.source.as_deref(),
            tx.merchant.as_deref(),
            tx.category.as_deref(),
        ]
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

        let business = Self::matches(&self.business, &haystack);
        let personal = Self::matches(&self.personal, &haystack);

        // Ambiguous matches default to personal
        if business && !personal {
            IncomeClass::Business
        } else {
            IncomeClass::Personal
        }
    }

    fn is_discretionary(&self, _tx: &Transaction, category: &str) -> bool {
        self.discretionary.contains(&category.to_uppercase())
    }

    fn is_unplanned(
        &self,
        _tx: &Transaction,
        amount: f64,
        history: Option<&CategoryStats>,
    ) -> bool {
        let Some(stats) = history else {
            return false;
        };
        let amounts = &stats.transaction_amounts;
        if amounts.count < self.unplanned_min_history.max(1) {
            return false;
        }
        amount > amounts.mean() + self.unplanned_std_devs * amounts.std_dev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    fn credit(source: &str) -> Transaction {
        Transaction {
            id: 1,
            user_id: 1,
            amount: Some(100.0),
            direction: Direction::Credit,
            category: None,
            merchant: None,
            source: Some(source.to_string()),
            timestamp: None,
        }
    }

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_business_income() {
        let c = classifier();
        assert_eq!(c.income_class(&credit("Upwork Project")), IncomeClass::Business);
        assert_eq!(
            c.income_class(&credit("ACME Consulting LLC")),
            IncomeClass::Business
        );
    }

    #[test]
    fn test_personal_income_and_ambiguity() {
        let c = classifier();
        assert_eq!(c.income_class(&credit("ACME Payroll")), IncomeClass::Personal);
        assert_eq!(c.income_class(&credit("Grandma")), IncomeClass::Personal);
        // Both lists match: personal wins
        assert_eq!(
            c.income_class(&credit("Client bonus")),
            IncomeClass::Personal
        );
    }

    #[test]
    fn test_keywords_are_escaped() {
        let config = ClassifierConfig {
            business_keywords: vec!["a.b (llc)".to_string()],
            ..Default::default()
        };
        let c = KeywordClassifier::new(&config).unwrap();
        assert_eq!(c.income_class(&credit("A.B (LLC)")), IncomeClass::Business);
        assert_eq!(c.income_class(&credit("axb llc")), IncomeClass::Personal);
    }

    #[test]
    fn test_discretionary_is_case_insensitive() {
        let c = classifier();
        let tx = credit("x");
        assert!(c.is_discretionary(&tx, "dining"));
        assert!(!c.is_discretionary(&tx, "HOUSING"));
    }

    #[test]
    fn test_unplanned_envelope() {
        let c = classifier();
        let tx = credit("x");
        let mut stats = CategoryStats::new(40.0);
        assert!(!c.is_unplanned(&tx, 500.0, None));

        for amount in [40.0, 45.0, 50.0] {
            stats.transaction_amounts.ingest(amount);
        }
        // mean 45, std 5: envelope tops out at 55
        assert!(!c.is_unplanned(&tx, 54.0, Some(&stats)));
        assert!(c.is_unplanned(&tx, 56.0, Some(&stats)));
    }

    #[test]
    fn test_unplanned_needs_history() {
        let c = classifier();
        let tx = credit("x");
        let mut stats = CategoryStats::new(40.0);
        stats.transaction_amounts.ingest(40.0);
        assert!(!c.is_unplanned(&tx, 4000.0, Some(&stats)));
    }
}
