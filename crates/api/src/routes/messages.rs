//! Outbound message endpoints: text, image, audio, location, reaction, and
//! typing indicator, forwarded one-to-one onto the upstream client wrapper
//! (spec §6, SPEC_FULL §B).

use axum::routing::post;
use axum::{Json, Router};
use axum::extract::State;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use proto::Jid;
use serde::{Deserialize, Serialize};
use upstream::SendResult;

use crate::error::{ApiError, ApiResult};
use crate::extract::{require_logged_in_session, require_user_id};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/send", post(send_text))
        .route("/messages/image", post(send_image))
        .route("/messages/audio", post(send_audio))
        .route("/messages/location", post(send_location))
        .route("/messages/react", post(send_reaction))
        .route("/messages/typing", post(send_typing))
}

#[derive(Serialize)]
struct SendResponse {
    id: String,
    timestamp: i64,
}

impl From<SendResult> for SendResponse {
    fn from(r: SendResult) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
        }
    }
}

fn upstream_failed(e: impl std::fmt::Display) -> ApiError {
    proto::Error::from(proto::UpstreamError::RequestFailed(e.to_string())).into()
}

#[derive(Deserialize)]
struct SendTextBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    text: Option<String>,
    /// Accepted for wire compatibility; the capability interface (spec
    /// §4.5) has no reply-threading parameter, so quoting is not forwarded.
    #[serde(default)]
    #[allow(dead_code)]
    reply_to: Option<String>,
}

fn require_chat_jid(raw: Option<String>) -> Result<Jid, ApiError> {
    match raw {
        Some(jid) if !jid.is_empty() => Ok(Jid::from(jid)),
        _ => Err(ApiError::InvalidField("chat_jid")),
    }
}

fn require_field(raw: Option<String>, name: &'static str) -> Result<String, ApiError> {
    match raw {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::InvalidField(name)),
    }
}

async fn session_for(
    state: &AppState,
    user_id: proto::UserId,
) -> ApiResult<std::sync::Arc<gateway::Session>> {
    require_logged_in_session(state, user_id)
}

async fn send_text(
    State(state): State<AppState>,
    Json(body): Json<SendTextBody>,
) -> ApiResult<Json<SendResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let text = require_field(body.text, "text")?;
    let session = session_for(&state, user_id).await?;
    let result = session
        .client
        .send_message(&chat_jid, &text)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct SendImageBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    image_b64: Option<String>,
    mime_type: Option<String>,
    #[serde(default)]
    caption: String,
}

async fn send_image(
    State(state): State<AppState>,
    Json(body): Json<SendImageBody>,
) -> ApiResult<Json<SendResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let mime_type = require_field(body.mime_type, "mime_type")?;
    let image_b64 = require_field(body.image_b64, "image_b64")?;
    let bytes = BASE64
        .decode(image_b64)
        .map_err(|_| ApiError::InvalidField("image_b64"))?;
    let session = session_for(&state, user_id).await?;
    let result = session
        .client
        .send_image(&chat_jid, &bytes, &mime_type, &body.caption)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct SendAudioBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    audio_b64: Option<String>,
    mime_type: Option<String>,
    #[serde(default)]
    ptt: bool,
    #[serde(default)]
    seconds: u32,
}

async fn send_audio(
    State(state): State<AppState>,
    Json(body): Json<SendAudioBody>,
) -> ApiResult<Json<SendResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let mime_type = require_field(body.mime_type, "mime_type")?;
    let audio_b64 = require_field(body.audio_b64, "audio_b64")?;
    let bytes = BASE64
        .decode(audio_b64)
        .map_err(|_| ApiError::InvalidField("audio_b64"))?;
    let session = session_for(&state, user_id).await?;
    let result = session
        .client
        .send_audio(&chat_jid, &bytes, &mime_type, body.ptt, body.seconds)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct SendLocationBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
}

async fn send_location(
    State(state): State<AppState>,
    Json(body): Json<SendLocationBody>,
) -> ApiResult<Json<SendResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let latitude = body.latitude.ok_or(ApiError::InvalidField("latitude"))?;
    let longitude = body.longitude.ok_or(ApiError::InvalidField("longitude"))?;
    let session = session_for(&state, user_id).await?;
    let result = session
        .client
        .send_location(&chat_jid, latitude, longitude, &body.name, &body.address)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct SendReactionBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    message_id: Option<String>,
    emoji: Option<String>,
}

async fn send_reaction(
    State(state): State<AppState>,
    Json(body): Json<SendReactionBody>,
) -> ApiResult<Json<SendResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let message_id = require_field(body.message_id, "message_id")?;
    let emoji = require_field(body.emoji, "emoji")?;
    let session = session_for(&state, user_id).await?;
    let result = session
        .client
        .send_reaction(&chat_jid, &message_id, &emoji)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
struct SendTypingBody {
    user_id: Option<u64>,
    chat_jid: Option<String>,
    typing: Option<bool>,
}

#[derive(Serialize)]
struct OkResponse {
    status: &'static str,
}

async fn send_typing(
    State(state): State<AppState>,
    Json(body): Json<SendTypingBody>,
) -> ApiResult<Json<OkResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let chat_jid = require_chat_jid(body.chat_jid)?;
    let typing = body.typing.ok_or(ApiError::InvalidField("typing"))?;
    let session = session_for(&state, user_id).await?;
    session
        .client
        .send_chat_presence(&chat_jid, typing)
        .await
        .map_err(upstream_failed)?;
    Ok(Json(OkResponse { status: "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::response::IntoResponse;
    use gateway::{SessionManager, SessionManagerConfig};
    use upstream::fake::FakeUpstreamClientFactory;

    use super::*;

    #[test]
    fn require_chat_jid_rejects_empty() {
        assert!(require_chat_jid(Some(String::new())).is_err());
        assert!(require_chat_jid(None).is_err());
        assert!(require_chat_jid(Some("1@s.whatsapp.net".to_string())).is_ok());
    }

    #[test]
    fn require_field_rejects_empty_and_missing() {
        assert!(require_field(None, "text").is_err());
        assert!(require_field(Some(String::new()), "text").is_err());
        assert!(require_field(Some("hi".to_string()), "text").is_ok());
    }

    #[tokio::test]
    async fn send_text_on_unpaired_session_is_400_not_logged_in() {
        let manager = SessionManager::new(
            SessionManagerConfig {
                data_dir: std::env::temp_dir(),
                remote_backup: None,
                encryption_key: None,
            },
            Arc::new(FakeUpstreamClientFactory::new(false)),
        );
        let user_id = proto::UserId::from(42);
        manager.get_or_create(user_id).await.unwrap();
        let state = AppState {
            manager: Arc::new(manager),
        };

        let err = send_text(
            State(state),
            Json(SendTextBody {
                user_id: Some(42),
                chat_jid: Some("1@s.whatsapp.net".to_string()),
                text: Some("hi".to_string()),
                reply_to: None,
            }),
        )
        .await
        .expect_err("unpaired session must not send");

        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
