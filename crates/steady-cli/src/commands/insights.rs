//! Insights, model and reset command implementations

use anyhow::{Context, Result};
use steady_core::{insights::DashboardInsights, BehaviorEngine};

pub fn cmd_insights(engine: &BehaviorEngine, user_id: i64, json: bool) -> Result<()> {
    let insights = engine
        .insights(user_id)
        .with_context(|| format!("Failed to compute insights for user {}", user_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        print_insights(user_id, &insights);
    }

    Ok(())
}

fn print_insights(user_id: i64, insights: &DashboardInsights) {
    let summary = &insights.behavior_summary;

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│          📈 Steady Insights             │");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  User:            {}", user_id);
    println!("  Transactions:    {}", summary.transaction_count);
    if summary.skipped_count > 0 {
        println!("  ⚠️  Skipped:       {}", summary.skipped_count);
    }
    println!("  Months covered:  {}", summary.coverage_months);
    println!("  Confidence:      {}", summary.confidence.as_str());

    if summary.transaction_count == 0 {
        println!();
        println!("  No data yet. Ingest transactions with:");
        println!("    steady ingest --file transactions.csv --user {}", user_id);
        return;
    }

    println!();
    match &insights.income_analysis {
        Some(income) => {
            println!("  💵 Income");
            println!("     Average monthly:  ${:.2}", income.average_monthly);
            println!(
                "     Volatility:       {:.0}% ({})",
                income.volatility * 100.0,
                income.volatility_level
            );
            println!(
                "     Range:            ${:.2} - ${:.2}",
                income.income_range.min, income.income_range.max
            );
            println!(
                "     Emergency fund:   ${:.2} ({} months)",
                income.recommended_emergency_fund.amount, income.recommended_emergency_fund.months
            );
            if income.is_gig_worker {
                println!("     Irregular income detected");
            }
        }
        None => println!("  💵 Income: not enough history yet"),
    }

    println!();
    println!("  🛒 Spending");
    println!(
        "     Monthly average:  ${:.2}",
        summary.monthly_spending_average
    );
    println!(
        "     Impulse score:    {:.0}% ({})",
        summary.impulse_score * 100.0,
        summary.impulse_level.as_str()
    );

    if let Some(flow) = &insights.cash_flow {
        let plan = &flow.smoothing;
        println!();
        println!("  📅 Cash flow (last {} months)", flow.months.len());
        for month in &flow.months {
            let lean = flow.lean_periods.months.iter().any(|m| m.month == month.month);
            println!(
                "     {}  in ${:>10.2}  out ${:>10.2}  net ${:>10.2}{}",
                month.month,
                month.income,
                month.expenses,
                month.net_flow,
                if lean { "  (lean)" } else { "" }
            );
        }
        println!("     {}", plan.strategy);
        println!(
            "     Buffer target:    ${:.2} ({:.0}% of good-month income, ${:.2}/mo)",
            plan.target_buffer,
            plan.recommended_save_rate * 100.0,
            plan.monthly_save_amount
        );
        if let Some(months) = plan.months_to_target {
            println!("     Months to target: {:.1}", months);
        }
        for rec in &plan.recommendations {
            println!("     • {}", rec);
        }
    }

    if !insights.risk_warnings.is_empty() {
        println!();
        println!("  ⚠️  Warnings");
        for warning in &insights.risk_warnings {
            println!("     [{}] {}", warning.severity.as_str(), warning.message);
        }
    }

    if !insights.quick_wins.is_empty() {
        println!();
        println!("  💡 Quick wins");
        for win in &insights.quick_wins {
            println!(
                "     {}: {} saves ${:.2}/mo (${:.2}/yr, {})",
                win.category,
                win.action,
                win.monthly_impact,
                win.annual_impact,
                win.difficulty.as_str()
            );
        }
    }

    if !insights.recommended_actions.is_empty() {
        println!();
        println!("  ✅ Recommended");
        for action in &insights.recommended_actions {
            println!("     {}", action);
        }
    }
    println!();
}

pub fn cmd_model(engine: &BehaviorEngine, user_id: i64) -> Result<()> {
    match engine.model(user_id).context("Failed to load model")? {
        Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        None => println!("No behavior model for user {}", user_id),
    }
    Ok(())
}

pub fn cmd_reset(engine: &BehaviorEngine, user_id: i64) -> Result<()> {
    if engine.reset(user_id).context("Failed to delete model")? {
        println!("🗑️  Deleted behavior model for user {}", user_id);
    } else {
        println!("No behavior model for user {}", user_id);
    }
    Ok(())
}
