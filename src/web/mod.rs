//! Web server module
//!
//! Provides the authenticated JSON API of the gateway.

mod auth;
mod error;
mod extract;
mod handlers;
mod routes;
mod state;

pub use auth::Credential;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
