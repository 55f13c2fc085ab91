//! Session lifecycle endpoints: pairing trigger, QR SSE stream, status,
//! explicit save, and delete (spec §4.2, §6).

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use gateway::{PairingTrigger, QrFrame};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extract::{require_session, require_user_id};
use crate::sse::QrReceiverLease;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/qr", get(qr_stream))
        .route("/sessions/status", get(status))
        .route("/sessions/save", post(save))
        .route("/sessions/delete", delete(delete_session))
}

#[derive(Deserialize)]
struct CreateSessionBody {
    user_id: Option<u64>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    status: &'static str,
    user_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let session = state.manager.get_or_create(user_id).await?;

    let trigger = gateway::trigger_pairing(&session).await?;

    let response = match trigger {
        PairingTrigger::NeedsQr => CreateSessionResponse {
            status: "needs_qr",
            user_id: user_id.as_u64(),
            phone: None,
        },
        PairingTrigger::Connected { phone } => CreateSessionResponse {
            status: "connected",
            user_id: user_id.as_u64(),
            phone,
        },
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
struct UserIdQuery {
    user_id: Option<u64>,
}

/// `GET /sessions/qr`: multiplexes QR codes, pairing success, and the
/// 2-minute hard timeout onto one SSE stream (spec §4.2). If no QR pump is
/// live for this session — already paired, or another subscriber already
/// holds the queue — the stream ends immediately with no frames.
async fn qr_stream(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Response> {
    let user_id = require_user_id(query.user_id)?;
    let session = require_session(&state, user_id)?;

    let stream = async_stream::stream! {
        let Some(rx) = session.take_qr_receiver().await else {
            return;
        };
        let mut lease = QrReceiverLease::new(session.clone(), rx);
        let deadline = gateway::qr_stream_deadline();
        loop {
            match gateway::next_qr_frame(&session, lease.receiver_mut(), deadline).await {
                QrFrame::Qr(code) => {
                    yield Ok::<_, std::convert::Infallible>(Event::default().event("qr").data(code));
                }
                QrFrame::Success => {
                    yield Ok(Event::default().event("success").data("logged_in"));
                    return;
                }
                QrFrame::Timeout => {
                    yield Ok(Event::default().event("timeout").data("qr_expired"));
                    return;
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

#[derive(Serialize)]
struct StatusResponse {
    connected: bool,
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

async fn status(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let user_id = require_user_id(query.user_id)?;
    let response = match state.manager.get(user_id) {
        Some(session) => StatusResponse {
            connected: session.client.is_connected(),
            logged_in: session.client.is_logged_in(),
            phone: session.client.phone_number(),
        },
        None => StatusResponse {
            connected: false,
            logged_in: false,
            phone: None,
        },
    };
    Ok(Json(response))
}

#[derive(Serialize)]
struct SavedResponse {
    status: &'static str,
}

async fn save(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Json<SavedResponse>> {
    let user_id = require_user_id(query.user_id)?;
    state.manager.save(user_id).await?;
    Ok(Json(SavedResponse { status: "saved" }))
}

#[derive(Serialize)]
struct DisconnectedResponse {
    status: &'static str,
}

async fn delete_session(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Json<DisconnectedResponse>> {
    let user_id = require_user_id(query.user_id)?;
    state.manager.remove(user_id).await?;
    Ok(Json(DisconnectedResponse {
        status: "disconnected",
    }))
}
