//! DuckDuckGo provider
//!
//! Text search scrapes the HTML-only endpoint. News, images and videos use
//! the site's JSON endpoints, which need a per-query `vqd` token. Answers
//! come from the Instant Answer API and chat from the duckchat endpoints.

use super::error::{Result, UpstreamError};
use super::traits::*;
use crate::config::OutgoingSettings;
use crate::network::{HttpClient, OutboundRequest, OutboundResponse};
use crate::query::{SafeSearch, TimeRange};
use async_trait::async_trait;
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

const REGION: &str = "wt-wt";

/// Upper bound on result pages fetched for one query
const MAX_PAGES: usize = 5;

static VQD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"vqd=["']?([0-9-]+)"#).expect("static vqd pattern"));

/// Base URLs of the DuckDuckGo services
#[derive(Debug, Clone)]
pub struct DuckDuckGoEndpoints {
    /// HTML-only search endpoint
    pub html: String,
    /// Main site: token page, JSON search endpoints, duckchat
    pub site: String,
    /// Instant Answer API
    pub api: String,
}

impl Default for DuckDuckGoEndpoints {
    fn default() -> Self {
        Self {
            html: "https://html.duckduckgo.com/html/".to_string(),
            site: "https://duckduckgo.com".to_string(),
            api: "https://api.duckduckgo.com/".to_string(),
        }
    }
}

impl DuckDuckGoEndpoints {
    /// Point every service at one base URL (used with mock servers)
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            html: format!("{base}/html/"),
            site: base.to_string(),
            api: format!("{base}/api/"),
        }
    }

    fn site_path(&self, path: &str) -> String {
        format!("{}/{}", self.site.trim_end_matches('/'), path)
    }
}

/// DuckDuckGo search provider
pub struct DuckDuckGo {
    endpoints: Arc<DuckDuckGoEndpoints>,
    outgoing: OutgoingSettings,
}

impl DuckDuckGo {
    pub fn new(outgoing: OutgoingSettings) -> Self {
        Self::with_endpoints(outgoing, DuckDuckGoEndpoints::default())
    }

    pub fn with_endpoints(outgoing: OutgoingSettings, endpoints: DuckDuckGoEndpoints) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            outgoing,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn open(&self) -> Result<Box<dyn UpstreamSession>> {
        let client = HttpClient::with_settings(&self.outgoing)?;
        Ok(Box::new(DuckDuckGoSession {
            client,
            endpoints: self.endpoints.clone(),
        }))
    }
}

/// One DuckDuckGo session: its own client, cookies and user agent
pub struct DuckDuckGoSession {
    client: HttpClient,
    endpoints: Arc<DuckDuckGoEndpoints>,
}

impl DuckDuckGoSession {
    async fn send(&self, request: OutboundRequest, what: &str) -> Result<OutboundResponse> {
        let response = self.client.execute(request).await?;
        check_status(&response, what)?;
        Ok(response)
    }

    /// Fetch the `vqd` token the JSON endpoints require
    async fn vqd(&self, keywords: &str) -> Result<String> {
        let request = OutboundRequest::get(self.endpoints.site_path("")).param("q", keywords);
        let response = self.send(request, "token page").await?;
        extract_vqd(&response.text)
            .ok_or_else(|| UpstreamError::Token(format!("vqd not found for {keywords:?}")))
    }

    async fn json_page(&self, request: OutboundRequest, what: &str) -> Result<JsonPage> {
        let response = self.send(request, what).await?;
        let body: Value = response.json()?;
        let rows = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next = body.get("next").and_then(Value::as_str).and_then(next_offset);
        Ok(JsonPage { rows, next })
    }

    /// Walk a JSON endpoint's `next` cursor until `max_results` distinct
    /// rows are collected or the pages run out.
    async fn json_pages(
        &self,
        request: OutboundRequest,
        what: &str,
        max_results: usize,
        key: &str,
        convert: fn(&Value) -> Option<SearchResult>,
    ) -> Result<Vec<SearchResult>> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut offset: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut page_request = request.clone();
            if let Some(ref s) = offset {
                page_request = page_request.param("s", s.as_str());
            }
            let fetched = self.json_page(page_request, what).await?;
            let rows = fetched.rows.iter().filter_map(convert);
            if absorb(&mut results, &mut seen, rows, key, max_results) {
                break;
            }
            match fetched.next {
                Some(next) if offset.as_deref() != Some(next.as_str()) => offset = Some(next),
                _ => break,
            }
            trace!(page = page + 1, what, "following next cursor");
        }

        debug!(count = results.len(), what, "duckduckgo rows collected");
        Ok(results)
    }

    async fn instant_answer(&self, q: &str) -> Result<Value> {
        let request = OutboundRequest::get(&self.endpoints.api)
            .param("q", q)
            .param("format", "json");
        let response = self.send(request, "instant answer").await?;
        if response.text.trim().is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }
}

#[async_trait]
impl UpstreamSession for DuckDuckGoSession {
    async fn text(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        trace!(keywords = %query.keywords, "duckduckgo text search");

        let mut form = vec![
            ("q".to_string(), query.keywords.clone()),
            ("b".to_string(), String::new()),
            ("kl".to_string(), REGION.to_string()),
            ("kp".to_string(), safesearch_param(query.safesearch).to_string()),
        ];
        if let Some(range) = query.time_range {
            form.push(("df".to_string(), range.code().to_string()));
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for page in 0..MAX_PAGES {
            let request = OutboundRequest::post(&self.endpoints.html).form(form.clone());
            let response = self.send(request, "html search").await?;
            let parsed = parse_text_page(&response.text)?;
            if absorb(&mut results, &mut seen, parsed.rows, "href", query.max_results) {
                break;
            }
            match parsed.next {
                Some(fields) => merge_fields(&mut form, fields),
                None => break,
            }
            trace!(page = page + 1, "posting next html page");
        }

        debug!(count = results.len(), "duckduckgo html results collected");
        Ok(results)
    }

    async fn news(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        let vqd = self.vqd(&query.keywords).await?;

        let mut request = OutboundRequest::get(self.endpoints.site_path("news.js"))
            .param("l", REGION)
            .param("o", "json")
            .param("noamp", "1")
            .param("q", &query.keywords)
            .param("vqd", vqd)
            .param("p", safesearch_param(query.safesearch));
        if let Some(range) = query.time_range {
            request = request.param("df", range.code());
        }

        self.json_pages(request, "news search", query.max_results, "url", news_row)
            .await
    }

    async fn images(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        let vqd = self.vqd(&query.keywords).await?;

        let time = query
            .time_range
            .map(|r| format!("time:{}", capitalize(r.as_str())))
            .unwrap_or_default();
        let p = match query.safesearch {
            SafeSearch::Off => "-1",
            _ => "1",
        };
        let request = OutboundRequest::get(self.endpoints.site_path("i.js"))
            .param("l", REGION)
            .param("o", "json")
            .param("q", &query.keywords)
            .param("vqd", vqd)
            .param("f", format!("{time},,,,,"))
            .param("p", p);

        self.json_pages(request, "image search", query.max_results, "image", image_row)
            .await
    }

    async fn videos(&mut self, query: &UpstreamQuery) -> Result<Vec<SearchResult>> {
        let vqd = self.vqd(&query.keywords).await?;

        let published = match query.time_range {
            Some(TimeRange::Year) | None => "",
            Some(range) => range.code(),
        };
        let definition = query.resolution.map(|r| r.as_str()).unwrap_or_default();
        let request = OutboundRequest::get(self.endpoints.site_path("v.js"))
            .param("l", REGION)
            .param("o", "json")
            .param("q", &query.keywords)
            .param("vqd", vqd)
            .param(
                "f",
                format!(
                    "publishedAfter:{published},videoDefinition:{definition},videoDuration:,videoLicense:"
                ),
            )
            .param("p", safesearch_param(query.safesearch));

        self.json_pages(request, "video search", query.max_results, "content", video_row)
            .await
    }

    async fn answers(&mut self, keywords: &str) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();

        let abstract_reply = self.instant_answer(&format!("what is {keywords}")).await?;
        if let Some(row) = abstract_row(&abstract_reply) {
            results.push(row);
        }

        let related = self.instant_answer(keywords).await?;
        results.extend(related_rows(&related));

        debug!(count = results.len(), "duckduckgo answers collected");
        Ok(results)
    }

    async fn chat(&mut self, prompt: &str, model: &str) -> Result<ChatReply> {
        let status = OutboundRequest::get(self.endpoints.site_path("duckchat/v1/status"))
            .header("x-vqd-accept", "1");
        let response = self.send(status, "chat status").await?;
        let vqd = response
            .header("x-vqd-4")
            .ok_or_else(|| UpstreamError::Token("x-vqd-4 header missing".to_string()))?
            .to_string();

        let payload = json!({
            "model": chat_model_id(model),
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = OutboundRequest::post(self.endpoints.site_path("duckchat/v1/chat"))
            .header("x-vqd-4", vqd)
            .json(payload);
        let response = self.send(request, "chat").await?;

        Ok(ChatReply {
            model: model.to_string(),
            message: collect_chat_stream(&response.text)?,
        })
    }
}

fn check_status(response: &OutboundResponse, what: &str) -> Result<()> {
    match response.status {
        // 202 is the provider's bot-challenge reply
        202 | 429 => Err(UpstreamError::RateLimited),
        _ if !response.is_success() => Err(UpstreamError::Http(format!(
            "{what} returned HTTP {}",
            response.status
        ))),
        _ => Ok(()),
    }
}

fn safesearch_param(level: SafeSearch) -> &'static str {
    match level {
        SafeSearch::Strict => "1",
        SafeSearch::Moderate => "-1",
        SafeSearch::Off => "-2",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Map the short model names onto the provider's identifiers; anything
/// else is forwarded unchanged.
pub fn chat_model_id(model: &str) -> &str {
    match model {
        "claude-3-haiku" => "claude-3-haiku-20240307",
        "gpt-4o-mini" => "gpt-4o-mini",
        "llama" => "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        "mixtral" => "mistralai/Mixtral-8x7B-Instruct-v0.1",
        other => other,
    }
}

pub(crate) fn extract_vqd(page: &str) -> Option<String> {
    VQD_RE
        .captures(page)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|v| !v.is_empty())
}

/// Strip markup and decode entities from a provider snippet
fn normalize(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.trim().to_string();
    }
    Html::parse_fragment(text)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolve DuckDuckGo's `//duckduckgo.com/l/?uddg=` redirect wrapper
fn extract_url(href: &str) -> Option<String> {
    let full = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&full).ok()?;

    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| UpstreamError::Parse(format!("invalid selector {css:?}: {e:?}")))
}

/// One page of the HTML endpoint
pub(crate) struct TextPage {
    pub rows: Vec<SearchResult>,
    /// Hidden fields of the "Next" form, if the page has one
    pub next: Option<Vec<(String, String)>>,
}

/// Parse the HTML endpoint's page into `{title, href, body}` rows
pub(crate) fn parse_text_page(html: &str) -> Result<TextPage> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result:not(.result--ad)")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut rows = Vec::new();
    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        let Some(href) = title_el.value().attr("href").and_then(extract_url) else {
            continue;
        };
        if title.is_empty() || href.contains("duckduckgo.com/y.js") {
            continue;
        }

        let body = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let mut row = Map::new();
        row.insert("title".to_string(), Value::String(title));
        row.insert("href".to_string(), Value::String(href));
        row.insert("body".to_string(), Value::String(body));
        rows.push(row);
    }

    let next = next_page_form(&document)?;
    Ok(TextPage { rows, next })
}

/// Hidden inputs of the `nav-link` form whose submit button reads "Next"
fn next_page_form(document: &Html) -> Result<Option<Vec<(String, String)>>> {
    let form_sel = selector("div.nav-link form")?;
    let input_sel = selector("input")?;

    Ok(document.select(&form_sel).find_map(|form| {
        let mut fields = Vec::new();
        let mut is_next = false;
        for input in form.select(&input_sel) {
            let el = input.value();
            match el.attr("type") {
                Some("hidden") => {
                    if let Some(name) = el.attr("name") {
                        let value = el.attr("value").unwrap_or_default();
                        fields.push((name.to_string(), value.to_string()));
                    }
                }
                Some("submit") => {
                    is_next |= el.attr("value").is_some_and(|v| v.eq_ignore_ascii_case("next"));
                }
                _ => {}
            }
        }
        (is_next && !fields.is_empty()).then_some(fields)
    }))
}

/// Overwrite or append `fields` onto a form payload
fn merge_fields(form: &mut Vec<(String, String)>, fields: Vec<(String, String)>) {
    for (name, value) in fields {
        match form.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => form.push((name, value)),
        }
    }
}

/// Append rows whose `key` has not been seen, stopping at `limit`.
/// Rows without `key` are always kept. Returns `true` once full.
fn absorb(
    results: &mut Vec<SearchResult>,
    seen: &mut HashSet<String>,
    rows: impl IntoIterator<Item = SearchResult>,
    key: &str,
    limit: usize,
) -> bool {
    for row in rows {
        if results.len() >= limit {
            break;
        }
        let fresh = match row.get(key).and_then(Value::as_str) {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        };
        if fresh {
            results.push(row);
        }
    }
    results.len() >= limit
}

struct JsonPage {
    rows: Vec<Value>,
    /// Offset (`s`) of the following page
    next: Option<String>,
}

/// Pull the `s` offset out of a JSON endpoint's relative `next` URL
fn next_offset(cursor: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    base.join(cursor)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "s")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn str_field(row: &Value, key: &str) -> Value {
    row.get(key)
        .and_then(Value::as_str)
        .map(|s| Value::String(normalize(s)))
        .unwrap_or(Value::Null)
}

fn news_row(row: &Value) -> Option<SearchResult> {
    let url = row.get("url").and_then(Value::as_str).unwrap_or_default();
    if url.is_empty() {
        return None;
    }
    let date = row
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| Value::String(dt.to_rfc3339()))
        .unwrap_or(Value::Null);

    let mut out = Map::new();
    out.insert("date".to_string(), date);
    out.insert("title".to_string(), str_field(row, "title"));
    out.insert("body".to_string(), str_field(row, "excerpt"));
    out.insert("url".to_string(), str_field(row, "url"));
    out.insert("image".to_string(), row.get("image").cloned().unwrap_or(Value::Null));
    out.insert("source".to_string(), str_field(row, "source"));
    Some(out)
}

fn image_row(row: &Value) -> Option<SearchResult> {
    let image = row.get("image").and_then(Value::as_str).unwrap_or_default();
    if image.is_empty() {
        return None;
    }
    let mut out = Map::new();
    out.insert("title".to_string(), str_field(row, "title"));
    for key in ["image", "thumbnail", "url", "height", "width", "source"] {
        out.insert(key.to_string(), row.get(key).cloned().unwrap_or(Value::Null));
    }
    Some(out)
}

/// Video rows pass through as-is
fn video_row(row: &Value) -> Option<SearchResult> {
    row.as_object().cloned()
}

fn icon_url(row: &Value) -> Value {
    match row.pointer("/Icon/URL").and_then(Value::as_str) {
        Some(path) if !path.is_empty() => Value::String(format!("https://duckduckgo.com{path}")),
        _ => Value::String(String::new()),
    }
}

fn answer_row(icon: Value, text: &str, topic: Value, url: Value) -> SearchResult {
    let mut out = Map::new();
    out.insert("icon".to_string(), icon);
    out.insert("text".to_string(), Value::String(text.to_string()));
    out.insert("topic".to_string(), topic);
    out.insert("url".to_string(), url);
    out
}

fn abstract_row(reply: &Value) -> Option<SearchResult> {
    let text = reply.get("AbstractText").and_then(Value::as_str)?;
    if text.is_empty() {
        return None;
    }
    let url = reply.get("AbstractURL").cloned().unwrap_or(Value::Null);
    Some(answer_row(Value::Null, text, Value::Null, url))
}

fn related_rows(reply: &Value) -> Vec<SearchResult> {
    let Some(topics) = reply.get("RelatedTopics").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for row in topics {
        match row.get("Name").and_then(Value::as_str) {
            Some(group) if !group.is_empty() => {
                let subtopics = row.get("Topics").and_then(Value::as_array);
                for sub in subtopics.into_iter().flatten() {
                    if let Some(text) = sub.get("Text").and_then(Value::as_str) {
                        let url = sub.get("FirstURL").cloned().unwrap_or(Value::Null);
                        results.push(answer_row(
                            icon_url(sub),
                            text,
                            Value::String(group.to_string()),
                            url,
                        ));
                    }
                }
            }
            _ => {
                if let Some(text) = row.get("Text").and_then(Value::as_str) {
                    let url = row.get("FirstURL").cloned().unwrap_or(Value::Null);
                    results.push(answer_row(icon_url(row), text, Value::Null, url));
                }
            }
        }
    }
    results
}

/// Join the `message` fragments of a duckchat event stream
pub(crate) fn collect_chat_stream(body: &str) -> Result<String> {
    let mut message = String::new();

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let event: Value = serde_json::from_str(data)
            .map_err(|e| UpstreamError::Parse(format!("invalid chat event: {e}")))?;
        if event.get("action").and_then(Value::as_str) == Some("error") {
            let kind = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
            return Err(UpstreamError::Http(format!("chat error: {kind}")));
        }
        if let Some(fragment) = event.get("message").and_then(Value::as_str) {
            message.push_str(fragment);
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOCK_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<div class="result results_links results_links_deep web-result result--ad">
    <a class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x">Sponsored</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">
        Rust Programming Language
    </a>
    <a class="result__snippet">A language empowering everyone.</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://doc.rust-lang.org/book/">The Rust Book</a>
    <a class="result__snippet">An introductory book about Rust.</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://doc.rust-lang.org/book/">The Rust Book (again)</a>
</div>
</body></html>"#;

    fn session_for(server: &MockServer) -> DuckDuckGoSession {
        DuckDuckGoSession {
            client: HttpClient::new().unwrap(),
            endpoints: Arc::new(DuckDuckGoEndpoints::single(&server.uri())),
        }
    }

    const NEXT_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://crates.io/">crates.io</a>
    <a class="result__snippet">The Rust package registry.</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://www.rust-lang.org/">Rust (repeat)</a>
</div>
<div class="nav-link">
<form action="/html/" method="post">
    <input type="submit" class="btn btn--alt" value="Previous" />
    <input type="hidden" name="q" value="rust" />
    <input type="hidden" name="s" value="0" />
</form>
</div>
</body></html>"#;

    /// `MOCK_HTML` with a "Next" form pointing at the second page
    fn first_page_html() -> String {
        MOCK_HTML.replace(
            "</body>",
            r#"<div class="nav-link">
<form action="/html/" method="post">
    <input type="submit" class="btn btn--alt" value="Next" />
    <input type="hidden" name="q" value="rust" />
    <input type="hidden" name="s" value="10" />
    <input type="hidden" name="nextParams" value="" />
    <input type="hidden" name="dc" value="11" />
    <input type="hidden" name="api" value="d.js" />
</form>
</div>
</body>"#,
        )
    }

    #[test]
    fn test_parse_text_page() {
        let page = parse_text_page(MOCK_HTML).unwrap();
        let hrefs: Vec<_> = page.rows.iter().map(|r| r["href"].clone()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://www.rust-lang.org/",
                "https://doc.rust-lang.org/book/",
                "https://doc.rust-lang.org/book/"
            ]
        );
        assert_eq!(page.rows[0]["title"], "Rust Programming Language");
        assert_eq!(page.rows[0]["body"], "A language empowering everyone.");
        assert!(page.next.is_none());
        assert!(parse_text_page("<html><body>No results.</body></html>")
            .unwrap()
            .rows
            .is_empty());
    }

    #[test]
    fn test_next_form_only_from_next_button() {
        let page = parse_text_page(&first_page_html()).unwrap();
        let next = page.next.unwrap();
        assert!(next.contains(&("s".to_string(), "10".to_string())));
        assert!(next.contains(&("dc".to_string(), "11".to_string())));

        assert!(parse_text_page(NEXT_PAGE_HTML).unwrap().next.is_none());
    }

    #[test]
    fn test_merge_fields_overwrites_and_appends() {
        let mut form = vec![
            ("q".to_string(), "rust".to_string()),
            ("kp".to_string(), "-1".to_string()),
        ];
        merge_fields(
            &mut form,
            vec![
                ("q".to_string(), "rust lang".to_string()),
                ("s".to_string(), "10".to_string()),
            ],
        );
        assert_eq!(form[0].1, "rust lang");
        assert_eq!(form[1], ("kp".to_string(), "-1".to_string()));
        assert_eq!(form[2], ("s".to_string(), "10".to_string()));
    }

    #[test]
    fn test_absorb_dedupes_and_stops_at_limit() {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let page = parse_text_page(MOCK_HTML).unwrap().rows;
        assert!(!absorb(&mut results, &mut seen, page.clone(), "href", 10));
        assert_eq!(results.len(), 2);

        let mut limited = Vec::new();
        assert!(absorb(&mut limited, &mut HashSet::new(), page, "href", 1));
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(
            next_offset("i.js?q=cats&o=json&p=1&s=100&u=bing&f=,,,&l=wt-wt"),
            Some("100".to_string())
        );
        assert_eq!(next_offset("news.js?q=x&o=json"), None);
    }

    #[test]
    fn test_extract_vqd_variants() {
        assert_eq!(
            extract_vqd(r#"...vqd="4-1234567890",..."#),
            Some("4-1234567890".to_string())
        );
        assert_eq!(
            extract_vqd("nrj('/d.js?q=x&vqd=4-987&kl=wt-wt')"),
            Some("4-987".to_string())
        );
        assert_eq!(extract_vqd("<html>nothing here</html>"), None);
    }

    #[test]
    fn test_collect_chat_stream() {
        let body = "data: {\"role\":\"assistant\",\"message\":\"Hel\"}\n\n\
                    data: {\"role\":\"assistant\",\"message\":\"lo\"}\n\n\
                    data: {\"role\":\"assistant\"}\n\n\
                    data: [DONE]\n\n\
                    data: {\"message\":\"ignored\"}\n";
        assert_eq!(collect_chat_stream(body).unwrap(), "Hello");
    }

    #[test]
    fn test_collect_chat_stream_error_event() {
        let body = "data: {\"action\":\"error\",\"type\":\"ERR_CONVERSATION_LIMIT\"}\n";
        assert!(matches!(
            collect_chat_stream(body),
            Err(UpstreamError::Http(msg)) if msg.contains("ERR_CONVERSATION_LIMIT")
        ));
    }

    #[test]
    fn test_chat_model_aliases() {
        assert_eq!(chat_model_id("claude-3-haiku"), "claude-3-haiku-20240307");
        assert_eq!(chat_model_id("test-model"), "test-model");
    }

    #[test]
    fn test_related_rows_flatten_groups() {
        let reply = json!({
            "RelatedTopics": [
                { "Text": "Rust (language)", "FirstURL": "https://duckduckgo.com/Rust", "Icon": { "URL": "/i/rust.png" } },
                { "Name": "Games", "Topics": [
                    { "Text": "Rust (video game)", "FirstURL": "https://duckduckgo.com/Rust_game", "Icon": { "URL": "" } }
                ]}
            ]
        });
        let rows = related_rows(&reply);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["icon"], "https://duckduckgo.com/i/rust.png");
        assert_eq!(rows[0]["topic"], Value::Null);
        assert_eq!(rows[1]["topic"], "Games");
        assert_eq!(rows[1]["icon"], "");
    }

    #[test]
    fn test_news_rows_normalize_and_dedupe() {
        let raw = [
            json!({ "date": 0, "title": "<b>Big</b> &amp; news", "excerpt": "x", "url": "https://a", "source": "A" }),
            json!({ "date": 0, "title": "dup", "url": "https://a" }),
            json!({ "title": "no url" }),
        ];
        let mut rows = Vec::new();
        absorb(&mut rows, &mut HashSet::new(), raw.iter().filter_map(news_row), "url", 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Big & news");
        assert_eq!(rows[0]["date"], "1970-01-01T00:00:00+00:00");
        assert_eq!(rows[0]["image"], Value::Null);
    }

    #[tokio::test]
    async fn test_text_search_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("q=rust"))
            .and(body_string_contains("kp=-2"))
            .and(body_string_contains("df=y"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_HTML))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let mut query = UpstreamQuery::new("rust");
        query.safesearch = SafeSearch::Off;
        query.time_range = Some(TimeRange::Year);

        let rows = session.text(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_text_search_follows_next_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("dc=11"))
            .and(body_string_contains("kp=-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NEXT_PAGE_HTML))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(first_page_html()))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let mut query = UpstreamQuery::new("rust");
        query.max_results = 50;

        let rows = session.text(&query).await.unwrap();
        let hrefs: Vec<_> = rows.iter().map(|r| r["href"].clone()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://www.rust-lang.org/",
                "https://doc.rust-lang.org/book/",
                "https://crates.io/"
            ]
        );
    }

    #[tokio::test]
    async fn test_text_search_stops_when_first_page_suffices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("dc=11"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NEXT_PAGE_HTML))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(first_page_html()))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let mut query = UpstreamQuery::new("rust");
        query.max_results = 2;

        let rows = session.text(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_image_search_follows_next_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"vqd="4-7""#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/i.js"))
            .and(query_param("s", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "title": "Cat 2 again", "image": "https://img/2.jpg" },
                    { "title": "Cat 3", "image": "https://img/3.jpg" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/i.js"))
            .and(query_param("vqd", "4-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "title": "Cat 1", "image": "https://img/1.jpg" },
                    { "title": "Cat 2", "image": "https://img/2.jpg" }
                ],
                "next": "i.js?q=cats&o=json&p=1&s=100&u=bing&f=,,,&l=wt-wt"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let mut query = UpstreamQuery::new("cats");
        query.max_results = 20;

        let rows = session.images(&query).await.unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec!["Cat 1", "Cat 2", "Cat 3"]);
    }

    #[tokio::test]
    async fn test_news_search_uses_vqd() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("q", "storm"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<script>vqd="4-42"</script>"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/news.js"))
            .and(query_param("vqd", "4-42"))
            .and(query_param("p", "-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "date": 1700000000, "title": "Storm", "excerpt": "Wind", "url": "https://n/1", "image": "https://n/1.jpg", "source": "N" },
                    { "date": 1700000100, "title": "Storm 2", "excerpt": "Rain", "url": "https://n/2", "source": "N" }
                ]
            })))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let rows = session.news(&UpstreamQuery::new("storm")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["body"], "Wind");
        assert_eq!(rows[0]["image"], "https://n/1.jpg");
    }

    #[tokio::test]
    async fn test_missing_vqd_is_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let err = session.images(&UpstreamQuery::new("cats")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Token(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let err = session.text(&UpstreamQuery::new("rust")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::RateLimited));
    }

    #[tokio::test]
    async fn test_chat_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/duckchat/v1/status"))
            .and(header("x-vqd-accept", "1"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-vqd-4", "chat-token"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/duckchat/v1/chat"))
            .and(header("x-vqd-4", "chat-token"))
            .and(body_string_contains("\"model\":\"test-model\""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"message\":\"It \"}\n\ndata: {\"message\":\"works\"}\n\ndata: [DONE]\n",
            ))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let reply = session.chat("summarize X", "test-model").await.unwrap();
        assert_eq!(reply.model, "test-model");
        assert_eq!(reply.message, "It works");
    }

    #[tokio::test]
    async fn test_answers_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("q", "what is rust"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AbstractText": "Rust is a language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("q", "rust"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "RelatedTopics": [{ "Text": "Rust crate", "FirstURL": "https://duckduckgo.com/c" }]
            })))
            .mount(&server)
            .await;

        let mut session = session_for(&server);
        let rows = session.answers("rust").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["text"], "Rust is a language.");
        assert_eq!(rows[1]["text"], "Rust crate");
    }
}
