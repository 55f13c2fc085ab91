//! Encrypted device-database backup: local ciphertext format plus the
//! remote transport used to persist/restore it across processes.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use proto::{BackupError, UserId};
use rand::RngCore;
use tracing::warn;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Loads and validates `WHATSAPP_SESSION_KEY`. Returns `None` (not an error)
/// when the variable is absent or is not exactly 32 bytes once
/// base64-decoded — persistence is simply disabled in that case.
pub fn load_encryption_key_from_env() -> Option<[u8; KEY_LEN]> {
    let raw = std::env::var("WHATSAPP_SESSION_KEY").ok()?;
    decode_encryption_key(&raw)
}

/// Decodes and length-validates a base64-encoded encryption key.
pub fn decode_encryption_key(base64_key: &str) -> Option<[u8; KEY_LEN]> {
    let bytes = BASE64.decode(base64_key.trim()).ok()?;
    if bytes.len() != KEY_LEN {
        warn!(
            len = bytes.len(),
            "WHATSAPP_SESSION_KEY is not 32 bytes once decoded; backup persistence disabled"
        );
        return None;
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Some(key)
}

/// Encrypts `plaintext` as `base64(nonce || AES-256-GCM(plaintext))` with a
/// fresh random 12-byte nonce and no associated data.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, BackupError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| BackupError::DecryptFailed)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| BackupError::DecryptFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Reverses [`encrypt`]. Any malformed ciphertext or wrong key yields
/// [`BackupError::DecryptFailed`].
pub fn decrypt(key: &[u8; KEY_LEN], ciphertext_b64: &str) -> Result<Vec<u8>, BackupError> {
    let raw = BASE64
        .decode(ciphertext_b64.trim())
        .map_err(|_| BackupError::DecryptFailed)?;
    if raw.len() < NONCE_LEN {
        return Err(BackupError::DecryptFailed);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| BackupError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &[],
            },
        )
        .map_err(|_| BackupError::DecryptFailed)
}

/// Remote backup endpoint: `GET`/`POST {base_url}/api/whatsapp/session`.
pub struct RemoteBackup {
    http: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct SaveRequest {
    user_id: u64,
    data: String,
}

#[derive(serde::Deserialize)]
struct RestoreResponse {
    #[serde(default)]
    data: Option<String>,
}

impl RemoteBackup {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetches stored ciphertext for `user_id`. A 404 or an empty body is
    /// "no backup" and returns `Ok(None)`, never an error — restore failures
    /// never block session creation.
    pub async fn restore(&self, user_id: UserId) -> Option<String> {
        let url = format!("{}/api/whatsapp/session", self.base_url.trim_end_matches('/'));
        let result = self
            .http
            .get(&url)
            .query(&[("user_id", user_id.as_u64().to_string())])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<RestoreResponse>().await {
                Ok(body) => body.data.filter(|d| !d.is_empty()),
                Err(e) => {
                    warn!(%e, "backup restore response could not be parsed; ignoring");
                    None
                }
            },
            Ok(resp) if resp.status().as_u16() == 404 => None,
            Ok(resp) => {
                warn!(status = %resp.status(), "backup restore returned a non-success status");
                None
            }
            Err(e) => {
                warn!(%e, "backup restore request failed");
                None
            }
        }
    }

    /// Persists ciphertext for `user_id`. Unlike restore, save failures are
    /// propagated to the caller (surfaced on explicit `/sessions/save`,
    /// ignored on `remove`).
    pub async fn save(&self, user_id: UserId, ciphertext: String) -> Result<(), BackupError> {
        let url = format!("{}/api/whatsapp/session", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&SaveRequest {
                user_id: user_id.as_u64(),
                data: ciphertext,
            })
            .send()
            .await
            .map_err(|e| BackupError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(BackupError::Transport(format!(
                "backup endpoint returned {}",
                resp.status()
            )))
        }
    }
}
