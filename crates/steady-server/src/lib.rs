//! Steady Web Server
//!
//! Axum-based REST API over the behavior engine.
//!
//! - Transaction batches are folded into per-user models with optimistic retries
//! - Dashboard insights are recomputed from the stored model on every read
//! - Engine calls run on the blocking pool (SQLite I/O and retry loops)
//! - Sanitized error responses; concurrency exhaustion surfaces as 409

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use steady_core::BehaviorEngine;

mod handlers;

/// Maximum transactions accepted in one request
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub engine: Arc<BehaviorEngine>,
}

/// Simple success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(engine: BehaviorEngine, config: ServerConfig) -> Router {
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions", post(handlers::ingest_transactions))
        .route(
            "/users/:id/transactions",
            post(handlers::ingest_user_transactions),
        )
        .route("/users/:id/insights", get(handlers::get_insights))
        .route(
            "/users/:id/model",
            get(handlers::get_model).delete(handlers::reset_model),
        );

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server with default configuration
pub async fn serve(engine: BehaviorEngine, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(engine, host, port, ServerConfig::default()).await
}

pub async fn serve_with_config(
    engine: BehaviorEngine,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.allowed_origins.is_empty() {
        info!(origins = ?config.allowed_origins, "CORS origins allowed");
    }

    let app = create_router(engine, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        match err.downcast_ref::<steady_core::Error>() {
            Some(steady_core::Error::ConcurrencyConflict { user_id, attempts }) => {
                warn!(user_id, attempts, "Write retries exhausted");
                Self::conflict("Model is being updated concurrently, retry the request")
            }
            Some(steady_core::Error::InvalidData(msg)) => Self::bad_request(msg),
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(err),
            },
        }
    }
}
