//! Server and API error types.

use std::io;
use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors that stop the snapshot server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind snapshot server address: {addr}")]
    BindAddress {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("snapshot server error on {addr}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Per-request failures, rendered as `{error, message}` JSON bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rich list not generated yet")]
    NotGenerated,

    #[error("Rich list snapshot unreadable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotGenerated => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "snapshot request failed");
        }
        let body = json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
