//! Cash-flow analysis: lean periods and income smoothing
//!
//! Works on per-month net flow (income minus spending) over the most recent
//! active months. A month is lean when its net flow is at or below the
//! configured percentile of that window. The smoothing plan sizes a savings
//! rate for good months that builds a buffer of several months of expenses.

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::income::VolatilityLevel;
use crate::models::{BehaviorModel, MonthKey};
use crate::stats::{round2, StreamAccumulator};

/// Income, spending and net flow for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCashFlow {
    pub month: MonthKey,
    pub income: f64,
    pub expenses: f64,
    pub net_flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeanMonth {
    pub month: MonthKey,
    pub net_flow: f64,
    /// Shortfall when net flow is negative, 0 otherwise
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeanPeriods {
    /// Net flow at the configured percentile of the window
    pub threshold: f64,
    pub months: Vec<LeanMonth>,
    /// Share of months in the window that are lean
    pub frequency: f64,
    pub avg_severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingPlan {
    pub avg_monthly_income: f64,
    pub avg_monthly_expenses: f64,
    pub income_volatility: f64,
    pub volatility_level: VolatilityLevel,
    /// Months whose surplus clears `good_month_surplus_ratio` of average income
    pub good_months: usize,
    /// Months where spending exceeded income
    pub deficit_months: usize,
    /// `smoothing_buffer_months` of average expenses
    pub target_buffer: f64,
    pub recommended_save_rate: f64,
    pub monthly_save_amount: f64,
    /// `None` when nothing can be set aside
    pub months_to_target: Option<f64>,
    pub strategy: String,
    pub recommendations: Vec<String>,
}

/// Cash-flow block of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowAnalysis {
    pub months: Vec<MonthlyCashFlow>,
    pub lean_periods: LeanPeriods,
    pub smoothing: SmoothingPlan,
}

impl CashFlowAnalysis {
    /// Share of the window spent in deficit
    pub fn deficit_ratio(&self) -> f64 {
        if self.months.is_empty() {
            0.0
        } else {
            self.smoothing.deficit_months as f64 / self.months.len() as f64
        }
    }
}

/// Per-month cash flow for the last `window` months, ending at the latest
/// active month
///
/// Only active months are listed. Income comes from the income buckets (0
/// for months without credits), expenses from the sum of category buckets.
pub fn monthly_cash_flow(model: &BehaviorModel, window: u32) -> Vec<MonthlyCashFlow> {
    let Some(latest) = model.active_months.last() else {
        return Vec::new();
    };

    model
        .active_months
        .iter()
        .filter(|m| m.months_until(latest) < window as i64)
        .map(|month| {
            let income = model
                .income
                .as_ref()
                .and_then(|s| s.monthly_totals.get(month))
                .copied()
                .unwrap_or(0.0);
            let expenses: f64 = model
                .categories
                .values()
                .filter_map(|c| c.monthly_totals.get(month))
                .sum();
            MonthlyCashFlow {
                month: *month,
                income: round2(income),
                expenses: round2(expenses),
                net_flow: round2(income - expenses),
            }
        })
        .collect()
}

fn lean_periods(flows: &[MonthlyCashFlow], config: &Configuration) -> LeanPeriods {
    let mut sorted: Vec<f64> = flows.iter().map(|f| f.net_flow).collect();
    sorted.sort_by(f64::total_cmp);
    let idx = ((sorted.len() as f64 * config.lean_period_percentile) as usize)
        .min(sorted.len().saturating_sub(1));
    let threshold = sorted.get(idx).copied().unwrap_or(0.0);

    let months: Vec<LeanMonth> = flows
        .iter()
        .filter(|f| f.net_flow <= threshold)
        .map(|f| LeanMonth {
            month: f.month,
            net_flow: f.net_flow,
            severity: round2((-f.net_flow).max(0.0)),
        })
        .collect();

    let (frequency, avg_severity) = if months.is_empty() {
        (0.0, 0.0)
    } else {
        (
            months.len() as f64 / flows.len() as f64,
            months.iter().map(|m| m.severity).sum::<f64>() / months.len() as f64,
        )
    };

    LeanPeriods {
        threshold,
        months,
        frequency: round2(frequency),
        avg_severity: round2(avg_severity),
    }
}

fn strategy(level: VolatilityLevel) -> &'static str {
    match level {
        VolatilityLevel::Stable => {
            "Your income is steady: save a fixed amount every month."
        }
        VolatilityLevel::Moderate => {
            "Your income varies: save a percentage of each payment rather than a fixed amount."
        }
        VolatilityLevel::High => {
            "Your income swings widely: bank the surplus of good months and draw on it in lean ones."
        }
    }
}

fn smoothing_plan(
    flows: &[MonthlyCashFlow],
    lean: &LeanPeriods,
    config: &Configuration,
) -> SmoothingPlan {
    let income = StreamAccumulator::from_values(flows.iter().map(|f| f.income));
    let expenses = StreamAccumulator::from_values(flows.iter().map(|f| f.expenses));
    let avg_income = income.mean();
    let avg_expenses = expenses.mean();
    let cv = income.coefficient_of_variation();
    let level = VolatilityLevel::from_coefficient(cv, config);

    let good: Vec<&MonthlyCashFlow> = flows
        .iter()
        .filter(|f| f.net_flow > avg_income * config.good_month_surplus_ratio)
        .collect();
    let deficit_months = flows.iter().filter(|f| f.net_flow < 0.0).count();
    let target = avg_expenses * config.smoothing_buffer_months as f64;

    let (rate, save_amount) = if good.is_empty() {
        let rate = config.default_smoothing_save_rate;
        (rate, avg_income * rate)
    } else {
        let n = good.len() as f64;
        let avg_good_surplus = good.iter().map(|f| f.net_flow).sum::<f64>() / n;
        let avg_good_income = good.iter().map(|f| f.income).sum::<f64>() / n;
        let rate = if avg_good_surplus > 0.0 {
            (target / (avg_good_surplus * 12.0)).min(config.max_smoothing_save_rate)
        } else {
            config.default_smoothing_save_rate
        };
        (rate, avg_good_income * rate)
    };

    let months_to_target = if target <= 0.0 {
        Some(0.0)
    } else if save_amount > 0.0 {
        Some(round2(target / save_amount))
    } else {
        None
    };

    let mut recommendations = Vec::new();
    if lean.frequency > config.frequent_lean_ratio {
        recommendations.push(format!(
            "Lean months are frequent ({:.0}% of recent months): build a buffer of {} months of expenses.",
            lean.frequency * 100.0,
            config.emergency_fund_months_high
        ));
    }
    if !good.is_empty() && save_amount > 0.0 {
        recommendations.push(format!(
            "In good months, set aside {:.0}% of income (about ${:.2}) to cover lean ones.",
            rate * 100.0,
            save_amount
        ));
    }
    if deficit_months > 0 {
        recommendations.push(format!(
            "Spending exceeded income in {} of the last {} months.",
            deficit_months,
            flows.len()
        ));
    }

    SmoothingPlan {
        avg_monthly_income: round2(avg_income),
        avg_monthly_expenses: round2(avg_expenses),
        income_volatility: (cv * 10_000.0).round() / 10_000.0,
        volatility_level: level,
        good_months: good.len(),
        deficit_months,
        target_buffer: round2(target),
        recommended_save_rate: round2(rate),
        monthly_save_amount: round2(save_amount),
        months_to_target,
        strategy: strategy(level).to_string(),
        recommendations,
    }
}

/// Derive the cash-flow block
///
/// Returns `None` until the user has income and at least one active month.
pub fn analyze(model: &BehaviorModel, config: &Configuration) -> Option<CashFlowAnalysis> {
    if model.income.is_none() {
        return None;
    }
    let months = monthly_cash_flow(model, config.cash_flow_window_months);
    if months.is_empty() {
        return None;
    }

    let lean_periods = lean_periods(&months, config);
    let smoothing = smoothing_plan(&months, &lean_periods, config);
    Some(CashFlowAnalysis {
        months,
        lean_periods,
        smoothing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryStats, IncomeStats};
    use crate::stats::bucket_add;
    use chrono::{TimeZone, Utc};

    fn month(m: u32) -> MonthKey {
        MonthKey::new(2025, m).unwrap()
    }

    /// Model with one income bucket and one spending bucket per month
    fn model(income: &[f64], spending: &[f64]) -> BehaviorModel {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut model = BehaviorModel::new(1, start);
        let mut stats = IncomeStats::start(income[0], start);
        let mut housing = CategoryStats::new(spending[0]);
        for (i, (inc, out)) in income.iter().zip(spending).enumerate() {
            let key = month(i as u32 + 1);
            model.active_months.insert(key);
            bucket_add(&mut stats.accumulator, &mut stats.monthly_totals, key, *inc);
            bucket_add(
                &mut housing.accumulator,
                &mut housing.monthly_totals,
                key,
                *out,
            );
        }
        model.income = Some(stats);
        model.categories.insert("HOUSING".into(), housing);
        model
    }

    #[test]
    fn test_no_income_has_no_cash_flow() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut model = BehaviorModel::new(1, start);
        model.active_months.insert(month(1));
        assert!(analyze(&model, &Configuration::default()).is_none());
    }

    #[test]
    fn test_net_flow_per_month() {
        let model = model(&[3000.0, 0.0, 1500.0], &[1000.0, 1200.0, 1000.0]);
        let flows = monthly_cash_flow(&model, 6);
        let net: Vec<f64> = flows.iter().map(|f| f.net_flow).collect();
        assert_eq!(net, vec![2000.0, -1200.0, 500.0]);
        assert_eq!(flows[1].income, 0.0);
        assert_eq!(flows[1].expenses, 1200.0);
    }

    #[test]
    fn test_window_keeps_latest_months() {
        let income = [1000.0; 8];
        let spending = [500.0; 8];
        let model = model(&income, &spending);
        let flows = monthly_cash_flow(&model, 6);
        assert_eq!(flows.len(), 6);
        assert_eq!(flows[0].month, month(3));
        assert_eq!(flows[5].month, month(8));
    }

    #[test]
    fn test_lean_months_at_or_below_percentile() {
        // Net flows: 2000, -1000, -500, 2000
        let model = model(
            &[3000.0, 0.0, 500.0, 3000.0],
            &[1000.0, 1000.0, 1000.0, 1000.0],
        );
        let analysis = analyze(&model, &Configuration::default()).unwrap();
        let lean = &analysis.lean_periods;

        // Index floor(4 * 0.25) = 1 of the sorted flows
        assert_eq!(lean.threshold, -500.0);
        let months: Vec<MonthKey> = lean.months.iter().map(|m| m.month).collect();
        assert_eq!(months, vec![month(2), month(3)]);
        assert_eq!(lean.frequency, 0.5);
        assert_eq!(lean.avg_severity, 750.0);
        assert_eq!(analysis.smoothing.deficit_months, 2);
        assert_eq!(analysis.deficit_ratio(), 0.5);
    }

    #[test]
    fn test_smoothing_rate_from_good_month_surplus() {
        let model = model(
            &[3000.0, 0.0, 500.0, 3000.0],
            &[1000.0, 1000.0, 1000.0, 1000.0],
        );
        let plan = analyze(&model, &Configuration::default()).unwrap().smoothing;

        assert_eq!(plan.avg_monthly_income, 1625.0);
        assert_eq!(plan.avg_monthly_expenses, 1000.0);
        assert_eq!(plan.volatility_level, VolatilityLevel::High);
        assert_eq!(plan.good_months, 2);
        assert_eq!(plan.target_buffer, 3000.0);
        // 3000 / (2000 * 12) = 0.125, under the 0.5 cap
        assert_eq!(plan.recommended_save_rate, 0.13);
        assert_eq!(plan.monthly_save_amount, 375.0);
        assert_eq!(plan.months_to_target, Some(8.0));
        assert!(plan.strategy.contains("swings widely"));
        assert!(plan.recommendations[0].contains("Lean months are frequent (50%"));
        assert!(plan.recommendations[2].contains("2 of the last 4 months"));
    }

    #[test]
    fn test_save_rate_is_capped() {
        // Thin surplus: 12 months of it would not reach the buffer
        let model = model(&[1200.0, 1200.0, 1200.0], &[1000.0, 1000.0, 1000.0]);
        let plan = analyze(&model, &Configuration::default()).unwrap().smoothing;
        assert_eq!(plan.good_months, 3);
        assert_eq!(plan.recommended_save_rate, 0.5);
        assert_eq!(plan.monthly_save_amount, 600.0);
        assert_eq!(plan.months_to_target, Some(5.0));
        assert_eq!(plan.volatility_level, VolatilityLevel::Stable);
    }

    #[test]
    fn test_no_good_months_falls_back_to_default_rate() {
        let model = model(&[900.0, 800.0], &[1000.0, 1000.0]);
        let plan = analyze(&model, &Configuration::default()).unwrap().smoothing;
        assert_eq!(plan.good_months, 0);
        assert_eq!(plan.deficit_months, 2);
        assert_eq!(plan.recommended_save_rate, 0.3);
        assert_eq!(plan.monthly_save_amount, 255.0);
    }
}
