//! HTTP networking module
//!
//! Provides the outbound HTTP client used by upstream sessions.

mod client;
mod user_agent;

pub use client::{HttpClient, OutboundRequest, OutboundResponse, RequestBody};
pub use user_agent::generate_user_agent;
