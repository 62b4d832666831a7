use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/songs/search", get(handlers::search_songs))
        .route("/songs/:id", get(handlers::get_song))
        .route("/songs/:id/similar", get(handlers::similar_songs))
        .route("/genres", get(handlers::genre_distribution))
        // Agents
        .route(
            "/agents",
            get(handlers::list_agents).post(handlers::create_agent),
        )
        .route("/agents/:id/onboard", post(handlers::onboard_agent))
        .route("/agents/:id/profile", get(handlers::get_profile))
        .route("/agents/:id/interactions", post(handlers::add_interaction))
        .route(
            "/agents/:id/recommendations",
            get(handlers::get_recommendations),
        )
}
