//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod insights;
pub mod transactions;

// Re-export all handlers for use in router
pub use insights::*;
pub use transactions::*;

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
