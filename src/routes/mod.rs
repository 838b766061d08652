use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    error::AppError,
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    services::RecommendationService,
};

pub mod admin;
pub mod recommendations;

/// Largest `limit` a client may ask for
pub const MAX_LIMIT: usize = 100;

/// Shared state handed to every handler
pub struct AppState {
    pub recommender: Arc<RecommendationService>,
    pub config: Config,
}

/// Creates the application router with all routes.
///
/// The request-id middleware is the outermost layer so the trace span and
/// every handler can read the id.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/recommendations/items/:item_key",
            get(recommendations::similar_items),
        )
        .route(
            "/users/:user_id/recommendations",
            get(recommendations::user_recommendations),
        )
        .route("/admin/index", get(admin::index_summary))
        .route("/admin/index/rebuild", post(admin::rebuild_index))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Resolves an optional `limit` query parameter against a default
pub(crate) fn resolve_limit(requested: Option<usize>, default: usize) -> Result<usize, AppError> {
    match requested {
        Some(limit) if limit > MAX_LIMIT => Err(AppError::InvalidInput(format!(
            "limit must be at most {}",
            MAX_LIMIT
        ))),
        Some(limit) => Ok(limit),
        None => Ok(default),
    }
}
