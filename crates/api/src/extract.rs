//! `user_id` parsing and session lookup shared by every handler: missing or
//! zero `user_id` is a 400, a missing session is a 404, and an unpaired
//! session is a 400 (spec §4.6).

use std::sync::Arc;

use gateway::Session;
use proto::{SessionError, UserId};

use crate::error::ApiError;
use crate::state::AppState;

pub fn require_user_id(raw: Option<u64>) -> Result<UserId, ApiError> {
    match raw {
        Some(0) | None => Err(ApiError::InvalidUserId),
        Some(v) => Ok(UserId::from(v)),
    }
}

/// Looks up the live session for `user_id`, 404-ing if none exists.
pub fn require_session(state: &AppState, user_id: UserId) -> Result<Arc<Session>, ApiError> {
    state
        .manager
        .get(user_id)
        .ok_or_else(|| proto::Error::from(SessionError::NotFound(user_id.as_u64())).into())
}

/// As [`require_session`], additionally 400-ing if pairing has not
/// completed yet — operations that forward onto the upstream client (chat
/// listing, group queries, sending) all require a logged-in device.
pub fn require_logged_in_session(
    state: &AppState,
    user_id: UserId,
) -> Result<Arc<Session>, ApiError> {
    let session = require_session(state, user_id)?;
    if !session.client.is_logged_in() {
        return Err(proto::Error::from(SessionError::NotLoggedIn).into());
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use upstream::fake::FakeUpstreamClientFactory;

    use super::*;

    #[test]
    fn zero_and_missing_are_rejected() {
        assert!(require_user_id(Some(0)).is_err());
        assert!(require_user_id(None).is_err());
    }

    #[test]
    fn positive_value_is_accepted() {
        assert_eq!(require_user_id(Some(7)).unwrap(), UserId::from(7));
    }

    async fn state_with(has_device_id: bool) -> (AppState, UserId) {
        let manager = gateway::SessionManager::new(
            gateway::SessionManagerConfig {
                data_dir: std::env::temp_dir(),
                remote_backup: None,
                encryption_key: None,
            },
            Arc::new(FakeUpstreamClientFactory::new(has_device_id)),
        );
        let user_id = UserId::from(11);
        manager.get_or_create(user_id).await.unwrap();
        (
            AppState {
                manager: Arc::new(manager),
            },
            user_id,
        )
    }

    #[tokio::test]
    async fn require_logged_in_session_rejects_unpaired_session() {
        let (state, user_id) = state_with(false).await;
        let err = require_logged_in_session(&state, user_id).unwrap_err();
        assert!(matches!(err, ApiError::Gateway(_)));
    }

    #[tokio::test]
    async fn require_logged_in_session_accepts_paired_session() {
        let (state, user_id) = state_with(true).await;
        assert!(require_logged_in_session(&state, user_id).is_ok());
    }

    #[tokio::test]
    async fn require_session_404s_on_unknown_user() {
        let (state, _) = state_with(false).await;
        assert!(require_session(&state, UserId::from(999)).is_err());
    }
}
