//! Application state shared across handlers

use super::auth::Credential;
use crate::config::Settings;
use crate::search::Gateway;
use crate::upstream::SearchProvider;
use std::sync::Arc;

/// Shared application state, fixed at startup
#[derive(Clone)]
pub struct AppState {
    /// Global settings
    pub settings: Arc<Settings>,
    /// Search gateway
    pub gateway: Arc<Gateway>,
    /// Bearer credential
    pub credential: Arc<Credential>,
}

impl AppState {
    /// Create new application state
    pub fn new(settings: Settings, provider: Arc<dyn SearchProvider>) -> Self {
        let gateway = Arc::new(Gateway::new(provider, &settings));
        let credential = Arc::new(Credential::new(&settings.server.secret_key));

        Self {
            settings: Arc::new(settings),
            gateway,
            credential,
        }
    }
}
