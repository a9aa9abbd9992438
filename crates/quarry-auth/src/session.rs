//! Process-wide credential session.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use quarry_core::{AuthMode, CLOUD_PLATFORM_SCOPE, QuarryConfig};

use crate::credential::{CredentialSource, SourceKind};
use crate::error::AuthError;
use crate::oauth::{ClientSecrets, GoogleOAuthProvider, OAuthSource};
use crate::service_account::ServiceAccountSource;
use crate::store::FileTokenStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the active credential source for the lifetime of the process.
///
/// Built once from configuration, handed to the dispatcher and warehouse
/// client, and shut down on exit.
pub struct AuthSession {
    source: Arc<dyn CredentialSource>,
    oauth: Option<Arc<OAuthSource>>,
    cancel: CancellationToken,
}

impl AuthSession {
    /// Build the configured source. Unusable key files or client secrets
    /// fail here, before anything is served.
    pub async fn from_config(
        config: &QuarryConfig,
        cancel: CancellationToken,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;

        match config.auth_mode()? {
            AuthMode::ServiceAccount { key_file } => {
                let scopes = vec![CLOUD_PLATFORM_SCOPE.to_string()];
                let source = match key_file {
                    Some(path) => {
                        tracing::info!(path = %path.display(), "Using service account key file");
                        ServiceAccountSource::from_key_file(&path, scopes, http)?
                    }
                    None => ServiceAccountSource::from_environment(scopes, http).await?,
                };
                Ok(Self::with_source(Arc::new(source), cancel))
            }
            AuthMode::OAuth => {
                let settings = &config.oauth;
                let secrets = ClientSecrets::load(&settings.client_secrets)?;
                tracing::info!(
                    client_id = %secrets.client_id,
                    token_file = %settings.token_file.display(),
                    "Using OAuth flow"
                );

                let mut provider = GoogleOAuthProvider::new(secrets, settings.scopes.clone(), http)
                    .with_callback_port(settings.callback_port);
                if !settings.open_browser {
                    provider = provider.with_browser(None);
                }

                let source = OAuthSource::new(
                    Arc::new(provider),
                    Arc::new(FileTokenStore::new(&settings.token_file)),
                    settings.authorization_timeout(),
                    cancel.clone(),
                );
                Ok(Self::with_oauth(Arc::new(source), cancel))
            }
        }
    }

    /// Session around an arbitrary source.
    pub fn with_source(source: Arc<dyn CredentialSource>, cancel: CancellationToken) -> Self {
        Self {
            source,
            oauth: None,
            cancel,
        }
    }

    /// Session around an OAuth source, exposing re-authentication.
    pub fn with_oauth(source: Arc<OAuthSource>, cancel: CancellationToken) -> Self {
        Self {
            source: source.clone(),
            oauth: Some(source),
            cancel,
        }
    }

    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        self.source.clone()
    }

    /// The OAuth source, when OAuth is the active strategy.
    pub fn oauth(&self) -> Option<&Arc<OAuthSource>> {
        self.oauth.as_ref()
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Abandon any pending authorization and flush the current token.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(oauth) = &self.oauth {
            if let Err(e) = oauth.flush().await {
                tracing::warn!(error = %e, "Failed to flush OAuth token on shutdown");
            }
        }
        tracing::debug!("Auth session shut down");
    }
}
