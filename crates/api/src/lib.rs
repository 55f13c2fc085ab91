//! HTTP Surface: binds the Session Manager, Pairing Pipeline, Inbound Event
//! Fan-Out, and Media Acquisition Pipeline to the wire contracts of spec
//! §4.6/§6. Every handler is JSON in / JSON out (SSE for the two streaming
//! endpoints); `user_id` is required and validated at the boundary.

pub mod error;
pub mod extract;
pub mod routes;
pub mod sse;
pub mod state;

pub use state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the complete router: every route from §6's endpoint table, plus
/// request tracing (spec SPEC_FULL §A.4 ambient concern).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::sessions::router())
        .merge(routes::events::router())
        .merge(routes::chats::router())
        .merge(routes::messages::router())
        .merge(routes::media::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
