use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use moneytrack_core::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::UnknownCategory(_) => ApiError::Validation("Invalid category".to_string()),
            StorageError::InvalidPeriod(e) => ApiError::Validation(e.to_string()),
            StorageError::DuplicateBudget => {
                ApiError::Conflict("Budget already exists for this category and period".to_string())
            }
            StorageError::DuplicateUser(field) => ApiError::Conflict(format!("{} is already taken", field)),
            StorageError::Overflow => {
                ApiError::Validation("Totals for this period exceed the supported range".to_string())
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Storage(_) | ApiError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_statuses() {
        assert_eq!(ApiError::from(StorageError::UnknownCategory(7)).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(StorageError::DuplicateBudget).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StorageError::Other("disk full".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::from(StorageError::Overflow).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".to_string()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Internal("x".to_string()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
