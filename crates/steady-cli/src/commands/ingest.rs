//! Ingest command implementation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use steady_core::{import::read_transactions, BehaviorEngine, IngestReport};
use tracing::info;

/// Engine report plus the CSV rows dropped before ingest
#[derive(Debug)]
pub struct IngestSummary {
    pub report: IngestReport,
    pub rejected: usize,
}

pub fn cmd_ingest(
    engine: &BehaviorEngine,
    file: &Path,
    default_user: Option<i64>,
) -> Result<IngestSummary> {
    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;

    println!("📥 Ingesting transactions from {}...", file.display());

    let import = read_transactions(BufReader::new(csv_file), default_user)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let rejected = import.rejected.len();
    if import.transactions.is_empty() {
        if let Some(first) = import.rejected.first() {
            bail!(
                "No usable rows in {}: {} rejected (row {}: {}). Pass --user for files without a user_id column",
                file.display(),
                rejected,
                first.line,
                first.reason
            );
        }
    }
    println!("   Parsed {} rows", import.transactions.len());

    let report = engine
        .ingest_batch(&import.transactions)
        .context("Failed to update behavior models")?;
    info!(
        file = %file.display(),
        users = report.users,
        applied = report.applied,
        skipped = report.skipped,
        rejected,
        "Ingest complete"
    );

    println!();
    println!("📊 Ingest Results");
    println!("   ─────────────────────────────");
    println!("   Users updated:      {}", report.users);
    println!("   Transactions used:  {}", report.applied);
    if report.skipped > 0 {
        println!("   ⚠️  Skipped (missing amount or timestamp): {}", report.skipped);
    }
    if rejected > 0 {
        println!("   ⚠️  Rejected (no usable user_id): {}", rejected);
        for row in import.rejected.iter().take(5) {
            println!("      row {}: {}", row.line, row.reason);
        }
    }
    if report.conflicts > 0 {
        println!("   Write conflicts retried: {}", report.conflicts);
    }

    Ok(IngestSummary { report, rejected })
}
