//! Upstream search provider module
//!
//! Defines the narrow contract the gateway calls through and the
//! DuckDuckGo implementation of it.

mod error;
mod traits;

pub mod duckduckgo;

#[cfg(test)]
pub(crate) mod mock;

pub use duckduckgo::{DuckDuckGo, DuckDuckGoEndpoints};
pub use error::UpstreamError;
pub use traits::*;
