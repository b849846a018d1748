//! Error taxonomy for the metric core.
//!
//! Only two things can go wrong: the caller handed us something invalid, or
//! the database could not be reached. An empty query result is not an error.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// Missing or malformed input. Never persisted.
    #[error("{0}")]
    Validation(String),

    /// The underlying record collection is unreachable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MetricError>;

impl MetricError {
    pub fn validation(message: impl Into<String>) -> Self {
        MetricError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MetricError::Validation(_) => StatusCode::BAD_REQUEST,
            MetricError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<JsonRejection> for MetricError {
    fn from(rejection: JsonRejection) -> Self {
        MetricError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for MetricError {
    fn from(rejection: QueryRejection) -> Self {
        MetricError::Validation(rejection.body_text())
    }
}

impl IntoResponse for MetricError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
