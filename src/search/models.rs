//! Request and response models for the gateway

use crate::config::SearchSettings;
use crate::upstream::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The six upstream operations, one per endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Text,
    News,
    Images,
    Videos,
    Answers,
    Chat,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Self::Text,
        Self::News,
        Self::Images,
        Self::Videos,
        Self::Answers,
        Self::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::News => "news",
            Self::Images => "images",
            Self::Videos => "videos",
            Self::Answers => "answers",
            Self::Chat => "chat",
        }
    }

    /// HTTP path serving this operation
    pub fn path(&self) -> &'static str {
        match self {
            Self::Text => "/search",
            Self::News => "/searchNews",
            Self::Images => "/searchImages",
            Self::Videos => "/searchVideos",
            Self::Answers => "/searchAnswers",
            Self::Chat => "/aichat",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a request's parameters were rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: q")]
    MissingQuery,
    #[error("max_results must be a non-negative integer")]
    InvalidMaxResults,
    #[error("Parameter {0} must be a string")]
    NotAString(&'static str),
    #[error("Request body must be a JSON object")]
    MalformedBody,
}

/// One gateway request, built per HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Query text (or chat prompt), trimmed and non-empty
    pub query: String,
    /// Upper bound on returned results
    pub max_results: usize,
    /// Chat model identifier
    pub model: String,
}

impl SearchRequest {
    /// Build a request from the `q`, `max_results` and `model` fields,
    /// filling the gaps from the configured defaults.
    pub fn from_fields(
        fields: &Map<String, Value>,
        defaults: &SearchSettings,
    ) -> Result<Self, ValidationError> {
        let query = match fields.get("q") {
            None | Some(Value::Null) => return Err(ValidationError::MissingQuery),
            Some(Value::String(q)) => q.trim(),
            Some(_) => return Err(ValidationError::NotAString("q")),
        };
        if query.is_empty() {
            return Err(ValidationError::MissingQuery);
        }

        let max_results = match fields.get("max_results") {
            None | Some(Value::Null) => defaults.default_max_results,
            Some(Value::Number(n)) => whole_number(n).ok_or(ValidationError::InvalidMaxResults)?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<usize>()
                .map_err(|_| ValidationError::InvalidMaxResults)?,
            Some(_) => return Err(ValidationError::InvalidMaxResults),
        };

        let model = match fields.get("model") {
            None | Some(Value::Null) => defaults.default_chat_model.clone(),
            Some(Value::String(m)) if m.trim().is_empty() => defaults.default_chat_model.clone(),
            Some(Value::String(m)) => m.trim().to_string(),
            Some(_) => return Err(ValidationError::NotAString("model")),
        };

        Ok(Self {
            query: query.to_string(),
            max_results,
            model,
        })
    }
}

/// The `{"results": [...]}` body every endpoint returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub results: Vec<SearchResult>,
}

impl ResultEnvelope {
    /// Wrap upstream rows, keeping at most `max_results` in upstream order
    pub fn bounded(mut results: Vec<SearchResult>, max_results: usize) -> Self {
        results.truncate(max_results);
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A JSON number that names a count: `3` and `3.0` qualify, `2.5` and `-1` don't
fn whole_number(n: &serde_json::Number) -> Option<usize> {
    if let Some(n) = n.as_u64() {
        return usize::try_from(n).ok();
    }
    let f = n.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64).then(|| f as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::mock::row;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn parse(value: Value) -> Result<SearchRequest, ValidationError> {
        SearchRequest::from_fields(&fields(value), &SearchSettings::default())
    }

    #[test]
    fn test_defaults_applied() {
        let req = parse(json!({ "q": "weather" })).unwrap();
        assert_eq!(req.query, "weather");
        assert_eq!(req.max_results, 10);
        assert_eq!(req.model, "claude-3-haiku");
    }

    #[test]
    fn test_missing_or_blank_query() {
        assert_eq!(parse(json!({})), Err(ValidationError::MissingQuery));
        assert_eq!(parse(json!({ "q": null })), Err(ValidationError::MissingQuery));
        assert_eq!(parse(json!({ "q": "   " })), Err(ValidationError::MissingQuery));
        assert_eq!(parse(json!({ "q": 5 })), Err(ValidationError::NotAString("q")));
    }

    #[test]
    fn test_max_results_coercion() {
        assert_eq!(parse(json!({ "q": "x", "max_results": 3 })).unwrap().max_results, 3);
        assert_eq!(parse(json!({ "q": "x", "max_results": "7" })).unwrap().max_results, 7);
        assert_eq!(parse(json!({ "q": "x", "max_results": 0 })).unwrap().max_results, 0);
        assert_eq!(parse(json!({ "q": "x", "max_results": 3.0 })).unwrap().max_results, 3);
        assert_eq!(parse(json!({ "q": "x", "max_results": 0.0 })).unwrap().max_results, 0);
    }

    #[test]
    fn test_invalid_max_results() {
        for bad in [json!(-1), json!(2.5), json!(-2.0), json!("ten"), json!("-3"), json!([1])] {
            assert_eq!(
                parse(json!({ "q": "x", "max_results": bad })),
                Err(ValidationError::InvalidMaxResults)
            );
        }
    }

    #[test]
    fn test_model_passthrough() {
        let req = parse(json!({ "q": "summarize X", "model": "test-model" })).unwrap();
        assert_eq!(req.model, "test-model");
        let req = parse(json!({ "q": "x", "model": "" })).unwrap();
        assert_eq!(req.model, "claude-3-haiku");
    }

    #[test]
    fn test_envelope_bounding() {
        let rows: Vec<_> = (0..7).map(row).collect();
        let envelope = ResultEnvelope::bounded(rows.clone(), 3);
        assert_eq!(envelope.len(), 3);
        assert_eq!(envelope.results[0], rows[0]);
        assert_eq!(envelope.results[2], rows[2]);

        assert_eq!(ResultEnvelope::bounded(rows.clone(), 100).len(), 7);
        assert!(ResultEnvelope::bounded(rows, 0).is_empty());
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = ResultEnvelope::bounded(vec![row(1)], 10);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({ "results": [{ "title": "result 1", "href": "https://example.com/1" }] })
        );
    }

    #[test]
    fn test_operation_paths() {
        let paths: Vec<_> = Operation::ALL.iter().map(|op| op.path()).collect();
        assert_eq!(
            paths,
            vec![
                "/search",
                "/searchNews",
                "/searchImages",
                "/searchVideos",
                "/searchAnswers",
                "/aichat"
            ]
        );
    }
}
