//! Process configuration, read once at startup from named environment
//! variables (spec §6 "Environment").

use std::path::PathBuf;

use crate::backup::{self, RemoteBackup};
use crate::manager::SessionManagerConfig;

const DEFAULT_PORT: u16 = 8090;
const DEFAULT_DATA_DIR: &str = "/data/whatsapp";

/// Fully-resolved process configuration.
pub struct GatewayConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub jo_bot_url: Option<String>,
    pub encryption_key: Option<[u8; 32]>,
}

impl GatewayConfig {
    /// Reads `PORT`, `DATA_DIR`, `JO_BOT_URL`, `WHATSAPP_SESSION_KEY` from
    /// the environment, falling back to their documented defaults. An
    /// invalid or absent `WHATSAPP_SESSION_KEY` disables backup persistence
    /// silently — it is never a startup error.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        let jo_bot_url = std::env::var("JO_BOT_URL").ok().filter(|s| !s.is_empty());
        let encryption_key = backup::load_encryption_key_from_env();

        Self {
            port,
            data_dir,
            jo_bot_url,
            encryption_key,
        }
    }

    /// Builds the [`SessionManagerConfig`] this process's Session Manager
    /// should start with.
    pub fn session_manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            data_dir: self.data_dir.clone(),
            remote_backup: self.jo_bot_url.clone().map(RemoteBackup::new),
            encryption_key: self.encryption_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_manager_config_disables_backup_without_jo_bot_url() {
        let config = GatewayConfig {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("/tmp"),
            jo_bot_url: None,
            encryption_key: Some([1u8; 32]),
        };
        assert!(config.session_manager_config().remote_backup.is_none());
    }
}
