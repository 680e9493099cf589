//! Error types for the demo API

use anysign_core::{BackendError, CallbackError, StoreError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docusign_backend::ConnectError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("Signature backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl From<ConnectError> for ApiError {
    fn from(e: ConnectError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Callback(e) => match e {
                CallbackError::NotFound { .. } => StatusCode::NOT_FOUND,
                CallbackError::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CallbackError::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
                CallbackError::Storage(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
                CallbackError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Backend(e) => match e {
                BackendError::Configuration(_) | BackendError::UnknownBackend(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::Storage(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Storage(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!("Request failed: {}", self);
            "Internal error".to_string()
        } else {
            tracing::warn!("Request rejected ({}): {}", status.as_u16(), self);
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
