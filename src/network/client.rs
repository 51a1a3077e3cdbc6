//! HTTP client for talking to the upstream provider

use super::user_agent::{accept_html, accept_json, accept_language, generate_user_agent};
use crate::config::OutgoingSettings;
use crate::upstream::UpstreamError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::collections::HashMap;

/// Body attached to an outbound request
#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// An outbound HTTP request
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl OutboundRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(url)
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Attach form data
    pub fn form(mut self, data: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(data));
        self
    }

    /// Attach a JSON body
    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(data));
        self
    }
}

/// Response captured from the upstream provider
#[derive(Debug)]
pub struct OutboundResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lower-case names)
    pub headers: HashMap<String, String>,
    /// Response body as text
    pub text: String,
}

impl OutboundResponse {
    /// Parse the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, UpstreamError> {
        serde_json::from_str(&self.text)
            .map_err(|e| UpstreamError::Parse(format!("invalid JSON body: {e}")))
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// HTTP client scoped to one upstream session.
///
/// Each instance owns its own cookie jar and user agent.
pub struct HttpClient {
    client: Client,
    user_agent: String,
    extra_headers: Vec<(String, String)>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self, UpstreamError> {
        let mut builder = Client::builder()
            .timeout(settings.timeout())
            .cookie_store(true)
            .gzip(true)
            .brotli(true);

        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url).map_err(client_error)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http).map_err(client_error)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https).map_err(client_error)?);
            }
        }

        let client = builder.build().map_err(client_error)?;

        Ok(Self {
            client,
            user_agent: generate_user_agent(),
            extra_headers: settings
                .extra_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Execute an outbound request
    pub async fn execute(
        &self,
        request: OutboundRequest,
    ) -> Result<OutboundResponse, UpstreamError> {
        let accept = match request.body {
            Some(RequestBody::Json(_)) => accept_json(),
            _ if request.url.ends_with(".js") => accept_json(),
            _ => accept_html(),
        };

        let mut req_builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", accept)
            .header("Accept-Language", accept_language())
            .header("DNT", "1");

        for (key, value) in self.extra_headers.iter().chain(request.headers.iter()) {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        if let Some(body) = request.body {
            req_builder = match body {
                RequestBody::Form(data) => req_builder.form(&data),
                RequestBody::Json(json) => req_builder.json(&json),
            };
        }

        let response = req_builder.send().await.map_err(send_error)?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let text = response.text().await.map_err(send_error)?;

        Ok(OutboundResponse {
            status,
            headers,
            text,
        })
    }

    /// Current user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

fn collect_headers(map: &HeaderMap) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| Some((k.as_str().to_ascii_lowercase(), v.to_str().ok()?.to_string())))
        .collect()
}

fn client_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Http(format!("client setup failed: {e}"))
}

fn send_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Http(e.to_string())
    }
}
