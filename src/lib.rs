use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use state::AppState;

/// Build the full application router: REST surface, websocket endpoint, CORS.
pub fn app(state: AppState) -> Router {
    // ToDo: Tighten this up
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::users::routes())
        .merge(routes::websocket::routes())
        .layer(cors)
        .with_state(state)
}
