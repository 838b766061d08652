use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult, middleware::request_id::RequestId, models::IndexSummary, routes::AppState,
};

/// Rebuilds and publishes the content similarity index
pub async fn rebuild_index(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<IndexSummary>> {
    tracing::info!(request_id = %request_id, "Index rebuild requested");

    let summary = state.recommender.rebuild_content_index().await?;

    tracing::info!(
        request_id = %request_id,
        version = summary.version,
        "Index rebuild completed"
    );

    Ok(Json(summary))
}

/// Describes the index currently serving queries
pub async fn index_summary(State(state): State<Arc<AppState>>) -> Json<IndexSummary> {
    Json(state.recommender.index_summary())
}
