use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::{ErrorBody, InvalidTaskId, ValidationError};
use thiserror::Error;

use crate::{store::StoreError, suggest::SuggestionError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Task not found")]
    NotFound,
    #[error("Invalid task id")]
    InvalidId(#[from] InvalidTaskId),
    #[error("Invalid task")]
    Validation(#[from] ValidationError),
    #[error("Invalid request body")]
    Body(#[from] JsonRejection),
    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("Request timed out")]
    Timeout,
    #[error("Unhandled internal error")]
    Middleware(String),
    #[error("Suggestions are not configured")]
    SuggestionsDisabled,
    #[error("Error fetching suggestions")]
    Suggestion(#[from] SuggestionError),
}

impl ApiError {
    /// Wraps a store failure with the message shown to the client.
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| ApiError::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidId(_) | ApiError::Validation(_) | ApiError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Store { .. } | ApiError::Middleware(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SuggestionsDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Suggestion(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::NotFound | ApiError::SuggestionsDisabled => None,
            ApiError::Timeout => Some("request exceeded the server timeout".to_string()),
            ApiError::Middleware(e) => Some(e.clone()),
            ApiError::InvalidId(e) => Some(e.to_string()),
            ApiError::Validation(e) => Some(e.to_string()),
            ApiError::Body(e) => Some(e.body_text()),
            ApiError::Store { source, .. } => Some(source.to_string()),
            ApiError::Suggestion(e) => Some(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            message: self.to_string(),
            error: self.detail(),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = ?body.error, "{}", body.message);
        } else {
            tracing::debug!(status = %status, error = ?body.error, "{}", body.message);
        }
        (status, Json(body)).into_response()
    }
}
