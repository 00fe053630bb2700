//! Router assembly

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, proxy, session};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/get-book-list", post(handlers::get_book_list))
        .route("/api/poll-signin", post(handlers::poll_signin))
        .route("/health", get(handlers::health))
        .fallback(proxy::proxy_fallback)
        .layer(middleware::from_fn(session::session_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
