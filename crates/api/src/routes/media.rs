//! `POST /media/download`: on-demand resolution of media referenced by a
//! previously delivered normalized payload (spec §4.4, §6).

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use gateway::media::resolve_media_download;
use proto::MediaDescriptor;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::{require_session, require_user_id};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/media/download", post(download))
}

#[derive(Deserialize)]
struct DownloadBody {
    user_id: Option<u64>,
    message_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    direct_path: Option<String>,
    #[serde(default)]
    media_key: Option<String>,
    #[serde(default)]
    file_enc_sha256: Option<String>,
    #[serde(default)]
    file_sha256: Option<String>,
    #[serde(default)]
    file_length: Option<u64>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    is_ptt: bool,
}

#[derive(Serialize)]
struct DownloadResponse {
    data: String,
    mime_type: Option<String>,
    size: usize,
}

async fn download(
    State(state): State<AppState>,
    Json(body): Json<DownloadBody>,
) -> ApiResult<Json<DownloadResponse>> {
    let user_id = require_user_id(body.user_id)?;
    let message_id = match body.message_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ApiError::InvalidField("message_id")),
    };

    let session = require_session(&state, user_id)?;

    let descriptor = MediaDescriptor {
        mime_type: body.mime_type.clone(),
        url: body.url,
        direct_path: body.direct_path,
        media_key: body.media_key,
        file_enc_sha256: body.file_enc_sha256,
        file_sha256: body.file_sha256,
        file_length: body.file_length,
        is_ptt: body.is_ptt,
    };

    let bytes = resolve_media_download(&session, &message_id, &descriptor)
        .await
        .map_err(proto::Error::from)?;

    Ok(Json(DownloadResponse {
        size: bytes.len(),
        data: BASE64.encode(bytes),
        mime_type: body.mime_type,
    }))
}
