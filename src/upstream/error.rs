//! Error types for upstream provider calls.
//!
//! Messages are for logs only. The web layer never forwards them to
//! callers.

/// Errors an upstream session can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The request could not be sent, or the provider answered with a
    /// non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider throttled us (HTTP 429 or a challenge page).
    #[error("rate limited by upstream provider")]
    RateLimited,

    /// The provider's reply did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A per-query token the provider requires could not be obtained.
    #[error("token error: {0}")]
    Token(String),

    /// The call did not complete within the configured timeout.
    #[error("upstream request timed out")]
    Timeout,
}

/// Convenience alias for upstream results.
pub type Result<T> = std::result::Result<T, UpstreamError>;
