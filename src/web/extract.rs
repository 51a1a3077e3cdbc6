//! Request parameter extraction
//!
//! `GET` reads the query string, a form-encoded `POST` reads the form, and
//! any other `POST` is read as a JSON object.

use super::error::ApiError;
use super::state::AppState;
use crate::search::{SearchRequest, ValidationError};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap, Method},
};
use serde_json::{Map, Value};

/// Extractor yielding a validated [`SearchRequest`]
#[derive(Debug)]
pub struct SearchParams(pub SearchRequest);

#[async_trait]
impl FromRequest<AppState> for SearchParams {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let fields = if req.method() == Method::GET || req.method() == Method::HEAD {
            urlencoded_fields(req.uri().query().unwrap_or_default().as_bytes())?
        } else {
            let form = is_form(req.headers());
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|_| ValidationError::MalformedBody)?;
            if form {
                urlencoded_fields(&body)?
            } else {
                json_fields(&body)?
            }
        };

        let request = SearchRequest::from_fields(&fields, state.gateway.defaults())?;
        Ok(Self(request))
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn urlencoded_fields(raw: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(raw).map_err(|_| ValidationError::MalformedBody)?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

fn json_fields(raw: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ValidationError::MalformedBody),
    }
}
