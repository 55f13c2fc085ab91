//! Session Manager: lifecycle, lookup, isolation, and encrypted persistence
//! of per-user upstream sessions (spec §4.1).

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use proto::{BackupError, Error, SessionError, UpstreamError as ProtoUpstreamError, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};
use upstream::UpstreamClientFactory;

use crate::backup::{self, RemoteBackup};
use crate::dispatch;
use crate::session::Session;

/// Immutable configuration the manager was constructed with.
pub struct SessionManagerConfig {
    pub data_dir: PathBuf,
    pub remote_backup: Option<RemoteBackup>,
    pub encryption_key: Option<[u8; 32]>,
}

/// Owns every live [`Session`], keyed by [`UserId`].
pub struct SessionManager {
    sessions: DashMap<UserId, Arc<Session>>,
    /// Serializes `get_or_create` so restoration + construction for a given
    /// user id is never duplicated by concurrent callers.
    creation_lock: Mutex<()>,
    config: SessionManagerConfig,
    client_factory: Arc<dyn UpstreamClientFactory>,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig, client_factory: Arc<dyn UpstreamClientFactory>) -> Self {
        Self {
            sessions: DashMap::new(),
            creation_lock: Mutex::new(()),
            config,
            client_factory,
        }
    }

    pub fn device_db_path(&self, user_id: UserId) -> PathBuf {
        self.config
            .data_dir
            .join(format!("user_{}.db", user_id.as_u64()))
    }

    /// Returns the existing session for `user_id`, or creates one.
    ///
    /// Restoration-from-backup and client construction happen once, under
    /// [`Self::creation_lock`], so concurrent callers for the same user
    /// observe a single [`Session`] instance (§8 quantified invariant).
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Arc<Session>, Error> {
        if let Some(existing) = self.sessions.get(&user_id) {
            existing.touch();
            return Ok(existing.clone());
        }

        let _guard = self.creation_lock.lock().await;
        if let Some(existing) = self.sessions.get(&user_id) {
            existing.touch();
            return Ok(existing.clone());
        }

        let device_db_path = self.device_db_path(user_id);
        self.restore_backup_best_effort(user_id, &device_db_path)
            .await;

        let media_http = upstream::build_media_client()
            .map_err(|e| ProtoUpstreamError::Connection(e.to_string()))?;
        let client = self
            .client_factory
            .open(&device_db_path, media_http)
            .await
            .map_err(|e| ProtoUpstreamError::Connection(e.to_string()))?;
        let client: Arc<dyn upstream::UpstreamClient> = Arc::from(client);

        let session = Arc::new(Session::new(user_id, client, device_db_path));
        dispatch::spawn_session_dispatcher(session.clone());

        self.sessions.insert(user_id, session.clone());
        info!(%user_id, "session created");
        Ok(session)
    }

    /// Returns the session for `user_id` if one is live, bumping its
    /// last-used timestamp.
    pub fn get(&self, user_id: UserId) -> Option<Arc<Session>> {
        let session = self.sessions.get(&user_id)?.clone();
        session.touch();
        Some(session)
    }

    /// Disconnects, best-effort backs up, and drops the session for
    /// `user_id`. A no-op (not an error) if no session exists.
    pub async fn remove(&self, user_id: UserId) -> Result<(), Error> {
        let Some((_, session)) = self.sessions.remove(&user_id) else {
            return Ok(());
        };
        session.client.disconnect().await;
        if let Err(e) = self.save_session(&session).await {
            warn!(%user_id, error = %e, "backup save on session removal failed; removing anyway");
        }
        info!(%user_id, "session removed");
        Ok(())
    }

    /// Pushes an explicit backup for `user_id`. Unlike removal, failures are
    /// propagated to the caller.
    pub async fn save(&self, user_id: UserId) -> Result<(), Error> {
        let session = self
            .sessions
            .get(&user_id)
            .map(|r| r.clone())
            .ok_or(SessionError::NotFound(user_id.as_u64()))?;
        self.save_session(&session).await.map_err(Error::from)
    }

    /// Disconnects and best-effort backs up every live session. Used by the
    /// server binary's graceful shutdown path; errors are logged, not
    /// propagated, since shutdown must still proceed.
    pub async fn shutdown(&self) {
        let user_ids: Vec<UserId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for user_id in user_ids {
            let _ = self.remove(user_id).await;
        }
        info!("session manager shutdown complete");
    }

    async fn restore_backup_best_effort(&self, user_id: UserId, device_db_path: &PathBuf) {
        let (Some(key), Some(backup)) = (&self.config.encryption_key, &self.config.remote_backup)
        else {
            return;
        };
        let Some(ciphertext) = backup.restore(user_id).await else {
            return;
        };
        match backup::decrypt(key, &ciphertext) {
            Ok(bytes) => {
                if let Err(e) = write_device_db(device_db_path, &bytes).await {
                    warn!(%user_id, error = %e, "failed to write restored device db; continuing without it");
                }
            }
            Err(e) => {
                warn!(%user_id, error = %e, "backup ciphertext failed to decrypt; continuing without it");
            }
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), BackupError> {
        let (Some(key), Some(backup)) = (&self.config.encryption_key, &self.config.remote_backup)
        else {
            return Err(BackupError::Disabled);
        };
        let bytes = tokio::fs::read(&session.device_db_path)
            .await
            .map_err(|e| BackupError::Transport(e.to_string()))?;
        let ciphertext = backup::encrypt(key, &bytes)?;
        backup.save(session.user_id, ciphertext).await
    }
}

#[cfg(unix)]
async fn write_device_db(path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::write(path, bytes).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn write_device_db(path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use upstream::fake::FakeUpstreamClientFactory;

    use super::*;

    fn manager_without_backup(data_dir: PathBuf) -> SessionManager {
        SessionManager::new(
            SessionManagerConfig {
                data_dir,
                remote_backup: None,
                encryption_key: None,
            },
            Arc::new(FakeUpstreamClientFactory::new(false)),
        )
    }

    #[tokio::test]
    async fn get_or_create_returns_same_session_for_concurrent_callers() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager_without_backup(dir.path().to_path_buf()));
        let user_id = UserId::from(7);

        let (a, b) = tokio::join!(
            manager.get_or_create(user_id),
            manager.get_or_create(user_id),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_without_backup(dir.path().to_path_buf());
        assert!(manager.get(UserId::from(99)).is_none());
    }

    #[tokio::test]
    async fn remove_on_unknown_user_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_without_backup(dir.path().to_path_buf());
        assert!(manager.remove(UserId::from(1)).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_removes_every_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_without_backup(dir.path().to_path_buf());
        manager.get_or_create(UserId::from(1)).await.unwrap();
        manager.get_or_create(UserId::from(2)).await.unwrap();

        manager.shutdown().await;

        assert!(manager.get(UserId::from(1)).is_none());
        assert!(manager.get(UserId::from(2)).is_none());
    }

    #[tokio::test]
    async fn save_without_backup_configured_errors() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_without_backup(dir.path().to_path_buf());
        let user_id = UserId::from(3);
        manager.get_or_create(user_id).await.unwrap();
        assert!(manager.save(user_id).await.is_err());
    }
}
