//! Gateway execution: one request, one upstream session

use super::models::{Operation, ResultEnvelope, SearchRequest};
use crate::config::{SearchSettings, Settings};
use crate::upstream::{SearchProvider, SearchResult, UpstreamError, UpstreamQuery, UpstreamSession};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Dispatches validated requests to the upstream provider
pub struct Gateway {
    /// Session factory
    provider: Arc<dyn SearchProvider>,
    /// Filters and defaults fixed at startup
    search: SearchSettings,
    /// Bound on a single upstream call
    call_timeout: Duration,
}

impl Gateway {
    /// Create a gateway from the loaded settings
    pub fn new(provider: Arc<dyn SearchProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            search: settings.search.clone(),
            call_timeout: settings.outgoing.timeout(),
        }
    }

    /// Override the upstream call timeout
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Defaults used when parsing requests
    pub fn defaults(&self) -> &SearchSettings {
        &self.search
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run `operation` for `request` and bound the result count.
    ///
    /// The session opened here is dropped before this returns, whichever
    /// way the call ends.
    pub async fn execute(
        &self,
        operation: Operation,
        request: &SearchRequest,
    ) -> Result<ResultEnvelope, UpstreamError> {
        let start = Instant::now();
        debug!(
            %operation,
            query = %request.query,
            max_results = request.max_results,
            "dispatching"
        );

        let mut session = self.provider.open().await?;
        let outcome = timeout(
            self.call_timeout,
            self.dispatch(session.as_mut(), operation, request),
        )
        .await;
        drop(session);

        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!(%operation, error = %e, "upstream call failed");
                return Err(e);
            }
            Err(_) => {
                warn!(%operation, timeout = ?self.call_timeout, "upstream call timed out");
                return Err(UpstreamError::Timeout);
            }
        };

        let upstream_count = results.len();
        let envelope = ResultEnvelope::bounded(results, request.max_results);
        info!(
            "{} search returned {} of {} results in {:?}",
            operation,
            envelope.len(),
            upstream_count,
            start.elapsed()
        );
        Ok(envelope)
    }

    async fn dispatch(
        &self,
        session: &mut dyn UpstreamSession,
        operation: Operation,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, UpstreamError> {
        match operation {
            Operation::Text => session.text(&self.upstream_query(operation, request)).await,
            Operation::News => session.news(&self.upstream_query(operation, request)).await,
            Operation::Images => session.images(&self.upstream_query(operation, request)).await,
            Operation::Videos => session.videos(&self.upstream_query(operation, request)).await,
            Operation::Answers => session.answers(&request.query).await,
            Operation::Chat => {
                let reply = session.chat(&request.query, &request.model).await?;
                Ok(vec![reply.into_result()])
            }
        }
    }

    /// Keyword-search parameters for `operation`
    pub fn upstream_query(&self, operation: Operation, request: &SearchRequest) -> UpstreamQuery {
        let time_range = match operation {
            Operation::Images | Operation::Videos => self.search.media_time_range,
            _ => self.search.time_range,
        };
        let resolution = match operation {
            Operation::Videos => self.search.video_resolution,
            _ => None,
        };

        UpstreamQuery {
            keywords: request.query.clone(),
            max_results: request.max_results,
            safesearch: self.search.safe_search,
            time_range,
            resolution,
        }
    }
}
