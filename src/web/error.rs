//! JSON error responses

use crate::search::ValidationError;
use crate::upstream::UpstreamError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every way a gateway request can fail
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong bearer credential
    #[error("Unauthorized access")]
    Unauthorized,

    /// Request parameters rejected before any upstream call
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The provider call failed; details stay in the logs
    #[error("Upstream search failed")]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
