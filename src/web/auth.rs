//! Bearer-token authentication

use super::error::ApiError;
use super::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::debug;

/// The process-wide shared secret, held as a digest
#[derive(Clone)]
pub struct Credential {
    digest: [u8; 32],
}

impl Credential {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Check an `Authorization` header value against the secret.
    ///
    /// Only `Bearer <secret>` is accepted. Digests are compared in
    /// constant time.
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) else {
            return false;
        };
        let presented: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Middleware rejecting requests without the bearer credential
pub async fn require_bearer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !state.credential.verify(authorization) {
        debug!(path = req.uri().path(), "rejected unauthenticated request");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
