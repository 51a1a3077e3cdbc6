//! Scripted provider for tests

use super::error::{Result, UpstreamError};
use super::traits::*;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted sessions saw
#[derive(Default)]
pub struct Probe {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
    pub calls: Mutex<Vec<&'static str>>,
    pub last_query: Mutex<Option<UpstreamQuery>>,
    pub last_model: Mutex<Option<String>>,
}

impl Probe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

/// Provider returning `rows` synthetic records per call, or failing
pub struct ScriptedProvider {
    pub probe: Arc<Probe>,
    rows: usize,
    fail: Option<UpstreamError>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            rows,
            fail: None,
            delay: None,
        }
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self {
            fail: Some(err),
            ..Self::with_rows(0)
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with_rows(1)
        }
    }
}

pub fn row(i: usize) -> SearchResult {
    let mut row = Map::new();
    row.insert("title".to_string(), Value::String(format!("result {i}")));
    row.insert(
        "href".to_string(),
        Value::String(format!("https://example.com/{i}")),
    );
    row
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self) -> Result<Box<dyn UpstreamSession>> {
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            probe: self.probe.clone(),
            rows: self.rows,
            fail: self.fail.clone(),
            delay: self.delay,
        }))
    }
}

struct ScriptedSession {
    probe: Arc<Probe>,
    rows: usize,
    fail: Option<UpstreamError>,
    delay: Option<Duration>,
}

impl ScriptedSession {
    async fn respond(&self, call: &'static str) -> Result<Vec<SearchResult>> {
        self.probe.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok((0..self.rows).map(row).collect()),
        }
    }

    fn record(&self, query: &UpstreamQuery) {
        *self.probe.last_query.lock().unwrap() = Some(query.clone());
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamSession for ScriptedSession {
    async fn text(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        self.record(query);
        self.respond("text").await
    }

    async fn news(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        self.record(query);
        self.respond("news").await
    }

    async fn images(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        self.record(query);
        self.respond("images").await
    }

    async fn videos(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        self.record(query);
        self.respond("videos").await
    }

    async fn answers(&mut self, _keywords: &str) -> Result<Vec<SearchResult>> {
        self.respond("answers").await
    }

    async fn chat(&mut self, prompt: &str, model: &str) -> Result<ChatReply> {
        *self.probe.last_model.lock().unwrap() = Some(model.to_string());
        self.respond("chat").await?;
        Ok(ChatReply {
            model: model.to_string(),
            message: format!("echo: {prompt}"),
        })
    }
}
