//! Transaction ingestion handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use steady_core::{Direction, IngestReport, Transaction};
use tracing::debug;

use crate::{AppError, AppState, MAX_BATCH_SIZE};

/// Transaction body for the per-user endpoint
///
/// The user comes from the path; a `user_id` in the body is ignored.
#[derive(Debug, Deserialize)]
pub struct TransactionInput {
    pub id: Option<i64>,
    pub amount: Option<f64>,
    pub direction: Direction,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionInput {
    fn into_transaction(self, user_id: i64, position: usize) -> Transaction {
        Transaction {
            id: self.id.unwrap_or(position as i64 + 1),
            user_id,
            amount: self.amount,
            direction: self.direction,
            category: self.category,
            merchant: self.merchant,
            source: self.source,
            timestamp: self.timestamp,
        }
    }
}

fn check_batch_size(len: usize) -> Result<(), AppError> {
    if len == 0 {
        return Err(AppError::bad_request("No transactions provided"));
    }
    if len > MAX_BATCH_SIZE {
        return Err(AppError::bad_request(&format!(
            "Batch too large: {} transactions (max {})",
            len, MAX_BATCH_SIZE
        )));
    }
    Ok(())
}

async fn run_ingest(
    state: &Arc<AppState>,
    transactions: Vec<Transaction>,
) -> Result<IngestReport, AppError> {
    let engine = Arc::clone(&state.engine);
    let report =
        tokio::task::spawn_blocking(move || engine.ingest_batch(&transactions)).await??;
    debug!(
        users = report.users,
        applied = report.applied,
        skipped = report.skipped,
        conflicts = report.conflicts,
        "Ingested batch"
    );
    Ok(report)
}

/// POST /api/transactions - Ingest a mixed-user batch
pub async fn ingest_transactions(
    State(state): State<Arc<AppState>>,
    Json(transactions): Json<Vec<Transaction>>,
) -> Result<Json<IngestReport>, AppError> {
    check_batch_size(transactions.len())?;
    Ok(Json(run_ingest(&state, transactions).await?))
}

/// POST /api/users/:id/transactions - Ingest a batch for one user
pub async fn ingest_user_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(inputs): Json<Vec<TransactionInput>>,
) -> Result<Json<IngestReport>, AppError> {
    check_batch_size(inputs.len())?;
    let transactions = inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| input.into_transaction(user_id, i))
        .collect();
    Ok(Json(run_ingest(&state, transactions).await?))
}
