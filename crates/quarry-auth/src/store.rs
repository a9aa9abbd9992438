//! Durable storage for the OAuth token record.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::AuthError;
use crate::token::OAuthToken;

/// File permissions for token files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Loads and persists the OAuth token record.
///
/// `load` never fails: a missing or unreadable record is simply absent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Option<OAuthToken>;

    async fn save(&self, token: &OAuthToken) -> Result<(), AuthError>;

    /// Remove the record. Removing an absent record succeeds.
    async fn clear(&self) -> Result<(), AuthError>;
}

/// Token record stored as a JSON file.
///
/// Writes go to a sibling temp file which is synced and then renamed over
/// the target, so a crash never leaves a half-written record behind. On
/// Unix the file is created 0600. The contents are not encrypted.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "token".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    async fn ensure_parent(&self) -> Result<(), AuthError> {
        let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(());
        }

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AuthError::Storage(format!(
                "failed to create token directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            tokio::fs::set_permissions(dir, perms).await.map_err(|e| {
                AuthError::Storage(format!(
                    "failed to set directory permissions on '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Option<OAuthToken> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read token file, ignoring it");
                return None;
            }
        };

        if content.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<OAuthToken>(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "Token file is corrupt, ignoring it");
                None
            }
        }
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    async fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        self.ensure_parent().await?;

        let content = serde_json::to_vec_pretty(token)?;
        let temp_path = self.temp_path();

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let write = async {
            let mut file = options.open(&temp_path).await?;
            file.write_all(&content).await?;
            file.sync_all().await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AuthError::Storage(format!(
                "failed to write temp file '{}': {}",
                temp_path.display(),
                e
            )));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AuthError::Storage(format!(
                "failed to rename '{}' to '{}': {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::debug!("Saved OAuth token");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn clear(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!("Removed OAuth token file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "failed to remove token file '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-process token store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<OAuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already stored.
    pub fn with_token(token: OAuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<OAuthToken> {
        self.token.lock().await.clone()
    }

    async fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        *self.token.lock().await = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        *self.token.lock().await = None;
        Ok(())
    }
}
