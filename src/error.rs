use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Domain failures the HTTP boundary needs to tell apart.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Error returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify an error coming out of the store, policy or finder layers.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<StoreError>() {
            Ok(StoreError::NotFound(what)) => ApiError::NotFound(what),
            Ok(StoreError::Conflict(msg)) => ApiError::Conflict(msg),
            Ok(StoreError::Invalid(msg)) => ApiError::BadRequest(msg),
            Err(err) => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self:#}");
        }
        (status, self.to_string()).into_response()
    }
}
