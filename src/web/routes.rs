//! Route definitions

use super::auth;
use super::handlers;
use super::state::AppState;
use crate::search::Operation;
use axum::{middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Search routes: POST is canonical, GET kept for query-string clients
    let searches = Router::new()
        .route(
            Operation::Text.path(),
            get(handlers::search).post(handlers::search),
        )
        .route(
            Operation::News.path(),
            get(handlers::search_news).post(handlers::search_news),
        )
        .route(
            Operation::Images.path(),
            get(handlers::search_images).post(handlers::search_images),
        )
        .route(
            Operation::Videos.path(),
            get(handlers::search_videos).post(handlers::search_videos),
        )
        .route(
            Operation::Answers.path(),
            get(handlers::search_answers).post(handlers::search_answers),
        )
        .route(
            Operation::Chat.path(),
            get(handlers::aichat).post(handlers::aichat),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(searches)
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
