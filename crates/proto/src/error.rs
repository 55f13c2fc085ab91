use thiserror::Error;

/// Top-level error type shared by the session manager, media pipeline, and
/// HTTP surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Session lifecycle error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Pairing pipeline error.
    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// Media acquisition error.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Upstream client/transport error.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Encrypted backup error.
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment value was present but malformed.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Session manager errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session exists for the given user id.
    #[error("session not found for user {0}")]
    NotFound(u64),

    /// The upstream device-identity store could not be opened.
    #[error("failed to open device store: {0}")]
    StoreOpen(String),

    /// The caller is not logged in to the upstream network yet.
    #[error("not logged in")]
    NotLoggedIn,
}

/// Pairing pipeline errors.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Failed to obtain a QR event stream from the upstream client.
    #[error("failed to start pairing: {0}")]
    StartFailed(String),
}

/// Media acquisition errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// A download attempt returned a transport-level error.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// All retry attempts were exhausted without a non-empty result.
    #[error("media retry attempts exhausted")]
    Exhausted,

    /// The requested message id has no cached or resolvable media.
    #[error("no media available for message {0}")]
    Unavailable(String),
}

/// Upstream client/transport errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection attempt failed (and was not an "already connected" race).
    #[error("connection failed: {0}")]
    Connection(String),

    /// Send/upload/download call failed.
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Encrypted backup errors.
#[derive(Debug, Error)]
pub enum BackupError {
    /// No encryption key configured; backup is a no-op feature.
    #[error("backup disabled: no encryption key configured")]
    Disabled,

    /// The remote backup transport returned a non-2xx response.
    #[error("backup transport error: {0}")]
    Transport(String),

    /// Ciphertext failed to decrypt (wrong key, corrupt payload, etc).
    #[error("decryption failed")]
    DecryptFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_session_error_into_top_level_error() {
        let err: Error = SessionError::NotFound(42).into();
        assert!(err.to_string().contains("Session error"));
    }

    #[test]
    fn wraps_media_error_into_top_level_error() {
        let err: Error = MediaError::Exhausted.into();
        assert!(err.to_string().contains("Media error"));
    }

    #[test]
    fn backup_disabled_message_is_stable() {
        let err = BackupError::Disabled;
        assert_eq!(err.to_string(), "backup disabled: no encryption key configured");
    }
}
