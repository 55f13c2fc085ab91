//! `GET /events`: the normalized inbound-message SSE stream (spec §4.3,
//! §6). Single consumer per user — see `SPEC_FULL.md` Open Question E.3.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use proto::MessageEnvelope;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{require_session, require_user_id};
use crate::sse::EventReceiverLease;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(events_stream))
}

#[derive(Deserialize)]
struct UserIdQuery {
    user_id: Option<u64>,
}

/// Streams every normalized payload enqueued for this user, in arrival
/// order, as `event: message` frames. Ends on client disconnect (detected at
/// the transport layer) or if the session's event queue closes (session
/// removed). If another subscriber already holds the queue, the stream ends
/// immediately with no frames.
async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Response> {
    let user_id = require_user_id(query.user_id)?;
    let session = require_session(&state, user_id)?;

    let stream = async_stream::stream! {
        let Some(rx) = session.take_event_receiver().await else {
            return;
        };
        let mut lease = EventReceiverLease::new(session.clone(), rx);
        while let Some(payload) = lease.receiver_mut().recv().await {
            let envelope = MessageEnvelope::new(payload);
            match serde_json::to_string(&envelope) {
                Ok(data) => yield Ok::<_, std::convert::Infallible>(Event::default().event("message").data(data)),
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize normalized payload");
                }
            }
        }
    };

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    response
        .headers_mut()
        .insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));
    Ok(response)
}
