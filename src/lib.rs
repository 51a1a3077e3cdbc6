//! search-gateway: an authenticated JSON gateway for DuckDuckGo search
//!
//! Six endpoints (web, news, images, videos, instant answers, AI chat)
//! check a bearer token, validate their parameters, call the upstream
//! provider through one short-lived session, and return at most
//! `max_results` records in a `{"results": [...]}` envelope.

pub mod config;
pub mod network;
pub mod query;
pub mod search;
pub mod upstream;
pub mod web;

pub use config::Settings;
pub use search::{Gateway, Operation, ResultEnvelope, SearchRequest};
pub use upstream::{SearchProvider, SearchResult, UpstreamError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
