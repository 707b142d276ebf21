//! Pure mapping from a behavior model to dashboard insights

use crate::cashflow::{self, CashFlowAnalysis};
use crate::config::Configuration;
use crate::income::{self, IncomeAnalysis, VolatilityLevel};
use crate::models::{BehaviorModel, Confidence, FlexibilityLevel};
use crate::spending::ImpulseLevel;
use crate::stats::round2;

use super::types::{
    BehaviorSummary, CategorySummary, DashboardInsights, Difficulty, QuickWin, RiskWarning,
    Severity, WarningKind,
};

/// Build the dashboard for a model
///
/// Nothing here is cached or persisted; callers invoke this on every read.
pub fn format_insights(model: &BehaviorModel, config: &Configuration) -> DashboardInsights {
    let income_analysis = income::analyze(model.income.as_ref(), config);
    let cash_flow = cashflow::analyze(model, config);

    DashboardInsights {
        behavior_summary: behavior_summary(model, income_analysis.as_ref(), config),
        risk_warnings: risk_warnings(
            model,
            income_analysis.as_ref(),
            cash_flow.as_ref(),
            config,
        ),
        quick_wins: quick_wins(model, config),
        recommended_actions: recommended_actions(income_analysis.as_ref(), config),
        income_analysis,
        cash_flow,
    }
}

fn behavior_summary(
    model: &BehaviorModel,
    income: Option<&IncomeAnalysis>,
    config: &Configuration,
) -> BehaviorSummary {
    let spending = model.monthly_spending_average();
    let income_expense_ratio = match income {
        Some(a) if spending > 0.0 => Some(round2(a.average_monthly / spending)),
        _ => None,
    };

    let categories = model
        .categories
        .iter()
        .map(|(name, stats)| CategorySummary {
            category: name.clone(),
            monthly_average: round2(stats.monthly_average()),
            reliability_score: round2(stats.reliability_score),
            elasticity: round2(stats.elasticity),
            flexibility_level: stats.flexibility_level,
            transaction_count: stats.transaction_count,
            baseline: round2(stats.baseline),
        })
        .collect();

    let impulse_score = model.impulse.score();
    BehaviorSummary {
        transaction_count: model.data_quality.transaction_count,
        skipped_count: model.data_quality.skipped_count,
        coverage_months: model.data_quality.coverage_months,
        confidence: model.data_quality.confidence,
        impulse_score: round2(impulse_score),
        impulse_level: ImpulseLevel::from_score(impulse_score, config),
        monthly_spending_average: round2(spending),
        income_expense_ratio,
        categories,
        peak_spending_hour: model.habits.peak_hour(),
        peak_spending_day: model.habits.peak_weekday().map(|d| d.to_string()),
        last_updated_at: model.last_updated_at,
    }
}

fn risk_warnings(
    model: &BehaviorModel,
    income: Option<&IncomeAnalysis>,
    cash_flow: Option<&CashFlowAnalysis>,
    config: &Configuration,
) -> Vec<RiskWarning> {
    let mut warnings = Vec::new();

    if let Some(analysis) = income {
        let severity = match analysis.volatility_level {
            VolatilityLevel::High => Some(Severity::High),
            VolatilityLevel::Moderate => Some(Severity::Warning),
            VolatilityLevel::Stable => None,
        };
        if let Some(severity) = severity {
            let fund = &analysis.recommended_emergency_fund;
            warnings.push(RiskWarning::new(
                WarningKind::IncomeVolatility,
                severity,
                format!(
                    "Your monthly income varies by {:.0}%. Aim for an emergency fund of ${:.2} ({} months of income).",
                    analysis.volatility * 100.0,
                    fund.amount,
                    fund.months
                ),
            ));
        }

        let spending = model.monthly_spending_average();
        if spending > analysis.average_monthly {
            warnings.push(RiskWarning::new(
                WarningKind::CashFlow,
                Severity::High,
                format!(
                    "Average monthly spending (${:.2}) exceeds average monthly income (${:.2}).",
                    spending, analysis.average_monthly
                ),
            ));
        }
    }

    if let Some(flow) = cash_flow.filter(|f| f.deficit_ratio() > config.frequent_lean_ratio) {
        warnings.push(RiskWarning::new(
            WarningKind::LeanPeriods,
            Severity::Warning,
            format!(
                "Spending exceeded income in {} of your last {} months. Build a buffer of ${:.2} by saving {:.0}% of income in good months.",
                flow.smoothing.deficit_months,
                flow.months.len(),
                flow.smoothing.target_buffer,
                flow.smoothing.recommended_save_rate * 100.0
            ),
        ));
    }

    let impulse_score = model.impulse.score();
    let impulse_severity = match ImpulseLevel::from_score(impulse_score, config) {
        ImpulseLevel::High => Some(Severity::High),
        ImpulseLevel::Moderate => Some(Severity::Warning),
        ImpulseLevel::Low => None,
    };
    if let Some(severity) = impulse_severity {
        warnings.push(RiskWarning::new(
            WarningKind::ImpulseSpending,
            severity,
            format!(
                "{:.0}% of your discretionary purchases look unplanned.",
                impulse_score * 100.0
            ),
        ));
    }

    if model.data_quality.confidence == Confidence::Low {
        warnings.push(RiskWarning::new(
            WarningKind::DataQuality,
            Severity::Info,
            format!(
                "These insights are based on {} transactions over {} months and will sharpen as more history arrives.",
                model.data_quality.transaction_count, model.data_quality.coverage_months
            ),
        ));
    }

    // Stable sort keeps insertion order within a severity
    warnings.sort_by(|a, b| b.severity.priority().cmp(&a.severity.priority()));
    warnings
}

fn quick_wins(model: &BehaviorModel, config: &Configuration) -> Vec<QuickWin> {
    let reduction = config.flexible_spending_reduction;

    let mut wins: Vec<QuickWin> = model
        .categories
        .iter()
        .filter(|(_, stats)| {
            matches!(
                stats.flexibility_level,
                FlexibilityLevel::Moderate | FlexibilityLevel::High
            )
        })
        .filter(|(_, stats)| {
            stats.monthly_average() * reduction >= config.quick_win_min_monthly_savings
        })
        .map(|(name, stats)| {
            let current = round2(stats.monthly_average());
            let monthly_impact = round2(current * reduction);
            QuickWin {
                category: name.clone(),
                action: format!("reduce spending by {:.0}%", reduction * 100.0),
                monthly_impact,
                annual_impact: round2(monthly_impact * 12.0),
                difficulty: Difficulty::from_flexibility(stats.flexibility_level),
                current_spending: current,
                new_spending: round2(current - monthly_impact),
            }
        })
        .collect();

    wins.sort_by(|a, b| {
        b.monthly_impact
            .total_cmp(&a.monthly_impact)
            .then_with(|| a.category.cmp(&b.category))
    });
    wins
}

fn recommended_actions(income: Option<&IncomeAnalysis>, config: &Configuration) -> Vec<String> {
    let Some(analysis) = income.filter(|a| a.is_gig_worker) else {
        return Vec::new();
    };

    vec![
        format!(
            "In a good month (income above ${:.2}), move {:.0}% of everything above your ${:.2} average into savings.",
            analysis.good_month_threshold,
            config.surplus_savings_multiplier * 100.0,
            analysis.average_monthly
        ),
        format!(
            "In a lean month (income below ${:.2}), cut flexible spending by {:.0}% and cover the gap from your emergency fund.",
            analysis.lean_month_threshold,
            config.flexible_spending_reduction * 100.0
        ),
    ]
}
