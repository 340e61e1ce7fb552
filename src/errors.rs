use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;

pub const PROVIDER_HEADER: HeaderName = HeaderName::from_static("x-provider");
pub const MODEL_HEADER: HeaderName = HeaderName::from_static("x-model");

/// Failures the HTTP surface reports before a research stream starts.
/// Backend failures never appear here: once the body is streaming they are
/// written into it as an `Error:` line instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "invalid_request_error",
            AppError::Internal(_) => "server_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        (status, Json(payload)).into_response()
    }
}

/// Tags a research response with the backend and model that will answer it.
pub fn tag_provider(headers: &mut HeaderMap, config: &ProviderConfig) {
    headers.insert(
        PROVIDER_HEADER,
        HeaderValue::from_static(config.kind.as_str()),
    );
    // Model names come from the environment and may not be header-safe.
    match HeaderValue::from_str(&config.model) {
        Ok(model) => {
            headers.insert(MODEL_HEADER, model);
        }
        Err(error) => debug!(model = %config.model, error = %error, "model name is not a valid header value"),
    }
}
