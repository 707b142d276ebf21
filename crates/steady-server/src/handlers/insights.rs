//! Insight and model handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use steady_core::{DashboardInsights, VersionedModel};

use crate::{AppError, AppState, SuccessResponse};

/// GET /api/users/:id/insights - Dashboard insights
///
/// Users without a model get the empty-model view rather than a 404.
pub async fn get_insights(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<DashboardInsights>, AppError> {
    let engine = Arc::clone(&state.engine);
    let insights = tokio::task::spawn_blocking(move || engine.insights(user_id)).await??;
    Ok(Json(insights))
}

/// GET /api/users/:id/model - Stored model snapshot with its version
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<VersionedModel>, AppError> {
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.model(user_id))
        .await??
        .map(Json)
        .ok_or_else(|| AppError::not_found("Behavior model not found"))
}

/// DELETE /api/users/:id/model - Forget a user's model
pub async fn reset_model(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let engine = Arc::clone(&state.engine);
    if tokio::task::spawn_blocking(move || engine.reset(user_id)).await?? {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(AppError::not_found("Behavior model not found"))
    }
}
