//! HTTP request handlers

use super::error::ApiError;
use super::extract::SearchParams;
use super::state::AppState;
use crate::search::{Operation, ResultEnvelope, SearchRequest};
use axum::{extract::State, response::IntoResponse, Json};

type Envelope = Result<Json<ResultEnvelope>, ApiError>;

async fn run(state: &AppState, operation: Operation, request: SearchRequest) -> Envelope {
    let envelope = state.gateway.execute(operation, &request).await?;
    Ok(Json(envelope))
}

/// Web search
pub async fn search(State(state): State<AppState>, SearchParams(req): SearchParams) -> Envelope {
    run(&state, Operation::Text, req).await
}

/// News search
pub async fn search_news(
    State(state): State<AppState>,
    SearchParams(req): SearchParams,
) -> Envelope {
    run(&state, Operation::News, req).await
}

/// Image search
pub async fn search_images(
    State(state): State<AppState>,
    SearchParams(req): SearchParams,
) -> Envelope {
    run(&state, Operation::Images, req).await
}

/// Video search
pub async fn search_videos(
    State(state): State<AppState>,
    SearchParams(req): SearchParams,
) -> Envelope {
    run(&state, Operation::Videos, req).await
}

/// Instant answers
pub async fn search_answers(
    State(state): State<AppState>,
    SearchParams(req): SearchParams,
) -> Envelope {
    run(&state, Operation::Answers, req).await
}

/// AI chat
pub async fn aichat(State(state): State<AppState>, SearchParams(req): SearchParams) -> Envelope {
    run(&state, Operation::Chat, req).await
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "provider": state.gateway.provider_name(),
        "safesearch": state.settings.search.safe_search,
    }))
}
