//! Maps every handler failure onto the JSON error envelope and status codes
//! required by spec §4.6/§7: `{"error": "<msg>"}`, 400 for client input and
//! not-logged-in, 404 for session-missing, 500 for everything else.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use proto::{Error as GatewayError, SessionError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or invalid user_id")]
    InvalidUserId,
    #[error("missing or invalid {0}")]
    InvalidField(&'static str),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidUserId | Self::InvalidField(_) => StatusCode::BAD_REQUEST,
            Self::Gateway(GatewayError::Session(SessionError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            Self::Gateway(GatewayError::Session(SessionError::NotLoggedIn)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_404() {
        let err = ApiError::from(GatewayError::from(SessionError::NotFound(1)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_logged_in_maps_to_400() {
        let err = ApiError::from(GatewayError::from(SessionError::NotLoggedIn));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_user_id_maps_to_400() {
        assert_eq!(ApiError::InvalidUserId.status(), StatusCode::BAD_REQUEST);
    }
}
