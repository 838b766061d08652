use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::{
    collaborative::ScoringError, index_store::IndexStoreError, indexer::IndexError,
};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Index store error: {0}")]
    IndexStore(#[from] IndexStoreError),

    #[error("Recommendation timed out")]
    Timeout,

    #[error("Recommendation cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::EmptyCorpus => AppError::EmptyCorpus,
            other => AppError::IndexBuild(other.to_string()),
        }
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Cancelled => AppError::Cancelled,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::EmptyCorpus | AppError::IndexBuild(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AppError::Timeout | AppError::Cancelled => {
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Store(_)
            | AppError::IndexStore(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_corpus_maps_to_unprocessable() {
        let response = AppError::from(IndexError::EmptyCorpus).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let response = AppError::Timeout.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_store_failure_is_internal() {
        let response = AppError::Store("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
