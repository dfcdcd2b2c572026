// routes.rs
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::AppState;

pub fn create_routes(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let api = Router::new()
        .route("/me", get(handlers::me))
        .route("/polls", get(handlers::list_polls).post(handlers::create_poll))
        .route("/polls/quick", post(handlers::create_quick_poll))
        .route(
            "/polls/{slug}",
            get(handlers::get_poll)
                .patch(handlers::update_poll)
                .delete(handlers::delete_poll),
        )
        .route("/polls/{slug}/publish", post(handlers::publish_poll))
        .route("/polls/{slug}/toggle", post(handlers::toggle_poll))
        .route("/polls/{slug}/close", post(handlers::close_poll))
        .route("/polls/{slug}/vote", post(handlers::vote))
        .route("/polls/{slug}/results", get(handlers::results))
        .route("/polls/{slug}/stats", get(handlers::stats))
        .route("/polls/{slug}/share", get(handlers::share))
        .route("/polls/{slug}/votes", get(handlers::vote_log));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/vote/{slug}", post(handlers::vote_form))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Explicit origins when configured, otherwise any origin without credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    }
}
