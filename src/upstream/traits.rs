//! Upstream provider contract

use super::error::Result;
use crate::query::{SafeSearch, TimeRange, VideoResolution};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One upstream record. Its shape belongs to the provider; the gateway
/// passes it through untouched.
pub type SearchResult = Map<String, Value>;

/// Parameters for the keyword searches (text, news, images, videos)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamQuery {
    /// Search keywords
    pub keywords: String,
    /// How many results the caller wants; providers may return more
    pub max_results: usize,
    /// Content filtering level
    pub safesearch: SafeSearch,
    /// Time window, if any
    pub time_range: Option<TimeRange>,
    /// Video definition filter (video search only)
    pub resolution: Option<VideoResolution>,
}

#[cfg(test)]
impl UpstreamQuery {
    pub(crate) fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            max_results: 10,
            safesearch: SafeSearch::default(),
            time_range: None,
            resolution: None,
        }
    }
}

/// A single chat completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Model identifier as requested by the caller
    pub model: String,
    /// Full assistant message
    pub message: String,
}

impl ChatReply {
    /// Render the reply as a result record
    pub fn into_result(self) -> SearchResult {
        let mut row = Map::new();
        row.insert("model".to_string(), Value::String(self.model));
        row.insert("message".to_string(), Value::String(self.message));
        row
    }
}

/// One upstream connection context.
///
/// A session serves exactly one gateway request and is released by
/// dropping it.
#[async_trait]
pub trait UpstreamSession: Send {
    /// Keyword web search
    async fn text(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>>;

    /// Keyword news search
    async fn news(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>>;

    /// Keyword image search
    async fn images(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>>;

    /// Keyword video search
    async fn videos(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>>;

    /// Direct-answer lookup
    async fn answers(&mut self, keywords: &str) -> Result<Vec<SearchResult>>;

    /// Send `prompt` to the named chat model
    async fn chat(&mut self, prompt: &str, model: &str) -> Result<ChatReply>;
}

/// Factory for upstream sessions
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Acquire a fresh session
    async fn open(&self) -> Result<Box<dyn UpstreamSession>>;
}
