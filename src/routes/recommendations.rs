use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{ItemKey, RecommendedItem, UserId},
    routes::{resolve_limit, AppState},
};

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Handler for content-similar items
pub async fn similar_items(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(item_key): Path<i64>,
    Query(params): Query<LimitQuery>,
) -> AppResult<Json<Vec<RecommendedItem>>> {
    let limit = resolve_limit(params.limit, state.config.content_top_n)?;

    let items = state
        .recommender
        .similar_items(ItemKey(item_key), limit)
        .await?;

    tracing::info!(
        request_id = %request_id,
        item_key,
        limit,
        returned = items.len(),
        "Served similar items"
    );

    Ok(Json(items))
}

/// Handler for a user's collaborative recommendations
pub async fn user_recommendations(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> AppResult<Json<Vec<RecommendedItem>>> {
    let limit = resolve_limit(params.limit, state.config.collab_top_k)?;

    let items = state
        .recommender
        .user_recommendations(UserId(user_id), limit)
        .await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        limit,
        returned = items.len(),
        "Served user recommendations"
    );

    Ok(Json(items))
}
