//! Read-only chat/group metadata endpoints, forwarded one-to-one onto the
//! upstream client wrapper (spec §6).

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use proto::{Chat, GroupInfo, Jid, Participant};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::extract::{require_logged_in_session, require_user_id};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats))
        .route("/groups/info", get(group_info))
        .route("/groups/participants", get(group_participants))
}

#[derive(Deserialize)]
struct UserIdQuery {
    user_id: Option<u64>,
}

async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<Json<Vec<Chat>>> {
    let user_id = require_user_id(query.user_id)?;
    let session = require_logged_in_session(&state, user_id)?;
    let chats = session
        .client
        .list_chats()
        .await
        .map_err(|e| proto::Error::from(proto::UpstreamError::RequestFailed(e.to_string())))?;
    Ok(Json(chats))
}

#[derive(Deserialize)]
struct GroupQuery {
    user_id: Option<u64>,
    group_jid: Option<String>,
}

fn require_group_jid(raw: Option<String>) -> Result<Jid, ApiError> {
    match raw {
        Some(jid) if !jid.is_empty() => Ok(Jid::from(jid)),
        _ => Err(ApiError::InvalidField("group_jid")),
    }
}

async fn group_info(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<GroupInfo>> {
    let user_id = require_user_id(query.user_id)?;
    let group_jid = require_group_jid(query.group_jid)?;
    let session = require_logged_in_session(&state, user_id)?;
    let info = session
        .client
        .group_info(&group_jid)
        .await
        .map_err(|e| proto::Error::from(proto::UpstreamError::RequestFailed(e.to_string())))?;
    Ok(Json(info))
}

async fn group_participants(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<Vec<Participant>>> {
    let user_id = require_user_id(query.user_id)?;
    let group_jid = require_group_jid(query.group_jid)?;
    let session = require_logged_in_session(&state, user_id)?;
    let participants = session
        .client
        .group_participants(&group_jid)
        .await
        .map_err(|e| proto::Error::from(proto::UpstreamError::RequestFailed(e.to_string())))?;
    Ok(Json(participants))
}
