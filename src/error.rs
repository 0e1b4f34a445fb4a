//! Error taxonomy shared by services and handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::common::ErrorResponse;
use crate::services::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// Naming collisions and concurrent-run guards
    #[error("{0}")]
    Conflict(String),

    /// Mutation of a built-in index sector
    #[error("{0}")]
    Protected(String),

    #[error("market data provider error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::Conflict(_) | AppError::Protected(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Protected(_) => "PROTECTED_SECTOR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.kind().to_string()),
        };

        (status, Json(body)).into_response()
    }
}
