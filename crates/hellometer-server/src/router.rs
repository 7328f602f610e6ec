//! Axum router wiring.
//!
//! Exposes `GET /hello` only. Every request gets a tracing span, and handler
//! panics are converted into a 500 instead of tearing down the connection.

use axum::{routing::get, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::{app_state::AppState, http};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/hello", get(http::hello::hello))
        .with_state(state)
        .layer(CatchPanicLayer::custom(http::error::panic_response))
        .layer(TraceLayer::new_for_http())
}
