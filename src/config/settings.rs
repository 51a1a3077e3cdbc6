//! Settings structures for the gateway configuration

use crate::query::{SafeSearch, TimeRange, VideoResolution};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main settings structure, loaded from settings.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub search: SearchSettings,
    pub outgoing: OutgoingSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// Merge with environment variables
    pub fn merge_env(&mut self) -> Result<()> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source
    pub(crate) fn merge_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("SECRET_KEY") {
            self.server.secret_key = val;
        }
        if let Some(val) = var("SAFESEARCH") {
            self.search.safe_search = val
                .parse::<SafeSearch>()
                .with_context(|| "SAFESEARCH must be one of strict, moderate, off")?;
        }
        if let Some(val) = var("SEARCH_GATEWAY_PORT").or_else(|| var("PORT")) {
            self.server.port = val
                .parse::<u16>()
                .with_context(|| format!("invalid port: {val:?}"))?;
        }
        if let Some(val) = var("SEARCH_GATEWAY_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
        if let Some(val) = var("SEARCH_GATEWAY_TIMEOUT") {
            self.outgoing.request_timeout = val
                .parse::<f64>()
                .with_context(|| format!("invalid timeout: {val:?}"))?;
        }
        Ok(())
    }

    /// Reject configurations the gateway cannot serve with
    pub fn validate(&self) -> Result<()> {
        if self.server.secret_key.trim().is_empty() {
            bail!("SECRET_KEY is not set; refusing to start without a bearer credential");
        }
        let timeout = self.outgoing.request_timeout;
        if timeout <= 0.0 || Duration::try_from_secs_f64(timeout).is_err() {
            bail!("outgoing.request_timeout must be a positive number of seconds");
        }
        Ok(())
    }
}

/// Server settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server port
    pub port: u16,
    /// Bind address
    pub bind_address: String,
    /// Bearer credential every search request must present
    #[serde(skip_serializing)]
    pub secret_key: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "127.0.0.1".to_string(),
            secret_key: String::new(),
        }
    }
}

// The secret never reaches a log line through `{:?}`.
impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("port", &self.port)
            .field("bind_address", &self.bind_address)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Search behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Safe search level forwarded to text, news, image and video search
    pub safe_search: SafeSearch,
    /// Time window for text and news search
    pub time_range: Option<TimeRange>,
    /// Time window for image and video search (`null` disables it)
    pub media_time_range: Option<TimeRange>,
    /// Video definition filter
    pub video_resolution: Option<VideoResolution>,
    /// Result count used when a request does not name one
    pub default_max_results: usize,
    /// Chat model used when a request does not name one
    pub default_chat_model: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            safe_search: SafeSearch::Moderate,
            time_range: Some(TimeRange::Year),
            media_time_range: Some(TimeRange::Year),
            video_resolution: None,
            default_max_results: 10,
            default_chat_model: "claude-3-haiku".to_string(),
        }
    }
}

const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Upstream request timeout in seconds
    pub request_timeout: f64,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT_SECS,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

impl OutgoingSettings {
    /// `request_timeout` as a `Duration`; values `validate` rejects fall
    /// back to the default.
    pub fn timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.request_timeout) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}
