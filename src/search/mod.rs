//! Search gateway module
//!
//! Validates requests, dispatches them to the upstream provider and
//! bounds what comes back.

mod executor;
mod models;

pub use executor::Gateway;
pub use models::*;
