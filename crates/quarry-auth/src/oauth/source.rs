//! OAuth credential lifecycle.
//!
//! ```text
//! Unauthenticated --acquire, no saved token--> Authorizing --code exchanged--> Authenticated
//!        ^                                          |                            |
//!        |<----------- denied / timeout ------------+                 expiry or 401
//!        |                                                                        v
//!        +<------- invalid_grant (reauth_required) / reset ------------------- Expired
//! ```
//!
//! One mutex owns the state. Whoever holds it performs the transition and
//! every concurrent caller waits for that result.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::provider::OAuthProvider;
use crate::credential::{Credential, CredentialSource, SourceKind};
use crate::error::AuthError;
use crate::store::TokenStore;
use crate::token::OAuthToken;

/// Observable lifecycle phase of an [`OAuthSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthPhase {
    Unauthenticated { reauth_required: bool },
    Authorizing,
    Authenticated,
    Expired,
}

/// `skip_store` is set once `reset` has discarded the token: the saved
/// record is not trusted again even if removing it failed.
#[derive(Clone)]
enum OAuthState {
    Unauthenticated {
        reauth_required: bool,
        skip_store: bool,
    },
    Authorizing {
        skip_store: bool,
    },
    Authenticated(OAuthToken),
    Expired(OAuthToken),
}

impl OAuthState {
    fn phase(&self) -> OAuthPhase {
        match self {
            OAuthState::Unauthenticated {
                reauth_required, ..
            } => OAuthPhase::Unauthenticated {
                reauth_required: *reauth_required,
            },
            OAuthState::Authorizing { .. } => OAuthPhase::Authorizing,
            OAuthState::Authenticated(_) => OAuthPhase::Authenticated,
            OAuthState::Expired(_) => OAuthPhase::Expired,
        }
    }
}

/// Credential source backed by an interactive OAuth login and a persisted
/// refresh token.
pub struct OAuthSource {
    provider: Arc<dyn OAuthProvider>,
    store: Arc<dyn TokenStore>,
    authorization_timeout: Duration,
    cancel: CancellationToken,
    state: Mutex<OAuthState>,
    phase: watch::Sender<OAuthPhase>,
}

impl OAuthSource {
    /// Create a source in the unauthenticated state. Nothing is loaded or
    /// opened until the first `acquire`.
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        store: Arc<dyn TokenStore>,
        authorization_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let initial = OAuthState::Unauthenticated {
            reauth_required: false,
            skip_store: false,
        };
        let (phase, _) = watch::channel(initial.phase());
        Self {
            provider,
            store,
            authorization_timeout,
            cancel,
            state: Mutex::new(initial),
            phase,
        }
    }

    /// Current phase, without waiting for an in-flight transition.
    pub fn phase(&self) -> OAuthPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<OAuthPhase> {
        self.phase.subscribe()
    }

    /// Discard the saved and in-memory token. The next `acquire` runs the
    /// interactive flow without reading the store, so a record that could
    /// not be removed is never picked up again.
    pub async fn reset(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        self.transition(
            &mut state,
            OAuthState::Unauthenticated {
                reauth_required: false,
                skip_store: true,
            },
        );
        self.store.clear().await?;
        info!("Discarded OAuth token, the next request will re-authorize");
        Ok(())
    }

    /// Write the current token back to the store.
    pub async fn flush(&self) -> Result<(), AuthError> {
        let state = self.state.lock().await;
        match &*state {
            OAuthState::Authenticated(token) | OAuthState::Expired(token) => {
                self.store.save(token).await
            }
            _ => Ok(()),
        }
    }

    fn transition(&self, state: &mut OAuthState, next: OAuthState) {
        debug!(from = ?state.phase(), to = ?next.phase(), "OAuth state transition");
        *state = next;
        self.phase.send_replace(state.phase());
    }

    async fn persist(&self, token: &OAuthToken) {
        if let Err(e) = self.store.save(token).await {
            error!(error = %e, "Failed to persist OAuth token");
        }
    }

    async fn refresh(
        &self,
        state: &mut OAuthState,
        token: OAuthToken,
    ) -> Result<Credential, AuthError> {
        info!("Refreshing OAuth access token");
        match self.provider.refresh(&token).await {
            Ok(fresh) => {
                self.persist(&fresh).await;
                let credential = fresh.credential();
                self.transition(state, OAuthState::Authenticated(fresh));
                Ok(credential)
            }
            Err(AuthError::InvalidGrant) => {
                warn!("Refresh token was rejected, re-authentication is required");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to remove rejected token file");
                }
                self.transition(
                    state,
                    OAuthState::Unauthenticated {
                        reauth_required: true,
                        skip_store: true,
                    },
                );
                Err(AuthError::ReauthRequired)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, will retry on the next request");
                Err(e)
            }
        }
    }

    async fn authorize(
        &self,
        state: &mut OAuthState,
        skip_store: bool,
    ) -> Result<Credential, AuthError> {
        self.transition(state, OAuthState::Authorizing { skip_store });
        info!(
            timeout_secs = self.authorization_timeout.as_secs(),
            "Starting interactive OAuth authorization"
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AuthError::Cancelled),
            outcome = tokio::time::timeout(self.authorization_timeout, self.provider.authorize()) => {
                outcome.unwrap_or_else(|_| Err(AuthError::Timeout(self.authorization_timeout)))
            }
        };

        match result {
            Ok(token) => {
                self.persist(&token).await;
                let credential = token.credential();
                self.transition(state, OAuthState::Authenticated(token));
                info!("OAuth authorization complete");
                Ok(credential)
            }
            Err(e) => {
                warn!(error = %e, "OAuth authorization failed");
                self.transition(
                    state,
                    OAuthState::Unauthenticated {
                        reauth_required: false,
                        skip_store,
                    },
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl CredentialSource for OAuthSource {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;
        loop {
            match state.clone() {
                OAuthState::Authenticated(token) if !token.is_expired() => {
                    return Ok(token.credential());
                }
                OAuthState::Authenticated(token) => {
                    debug!("Access token expired");
                    self.transition(&mut state, OAuthState::Expired(token));
                }
                OAuthState::Expired(token) => return self.refresh(&mut state, token).await,
                OAuthState::Unauthenticated {
                    reauth_required: true,
                    ..
                } => return Err(AuthError::ReauthRequired),
                // Authorizing is only visible here if a previous caller was dropped mid-flow.
                OAuthState::Unauthenticated {
                    skip_store: true, ..
                }
                | OAuthState::Authorizing { skip_store: true } => {
                    return self.authorize(&mut state, true).await;
                }
                OAuthState::Unauthenticated { .. } | OAuthState::Authorizing { .. } => {
                    match self.store.load().await {
                        Some(token) => {
                            info!(expires_at = %token.expires_at, "Loaded saved OAuth token");
                            let next = if token.is_expired() {
                                OAuthState::Expired(token)
                            } else {
                                OAuthState::Authenticated(token)
                            };
                            self.transition(&mut state, next);
                        }
                        None => return self.authorize(&mut state, false).await,
                    }
                }
            }
        }
    }

    async fn invalidate(&self, credential: &Credential) {
        let mut state = self.state.lock().await;
        let rejected = match &*state {
            OAuthState::Authenticated(token) if token.access_token == credential.token() => {
                Some(token.clone())
            }
            _ => None,
        };
        if let Some(token) = rejected {
            info!("Access token was rejected, marking it expired");
            self.transition(&mut state, OAuthState::Expired(token));
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::OAuth
    }
}
