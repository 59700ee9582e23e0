use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every `/detect` failure, whatever its origin, is reported to the caller as a 400.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClientInputError(pub String);

impl From<anyhow::Error> for ClientInputError {
    fn from(e: anyhow::Error) -> Self {
        Self(format!("{e:#}"))
    }
}

impl From<JsonRejection> for ClientInputError {
    fn from(e: JsonRejection) -> Self {
        Self(e.body_text())
    }
}

impl IntoResponse for ClientInputError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": format!("Error processing images: {}", self.0) })),
        )
            .into_response()
    }
}
