//! Bearer credentials and the sources that produce them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::AuthError;

/// An access token handed to warehouse calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Which strategy a source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ServiceAccount,
    OAuth,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::ServiceAccount => write!(f, "service-account"),
            SourceKind::OAuth => write!(f, "oauth"),
        }
    }
}

/// Produces valid credentials for warehouse calls.
///
/// Implementations serialize acquisition so concurrent callers share one
/// refresh or authorization.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return a credential that is valid right now.
    async fn acquire(&self) -> Result<Credential, AuthError>;

    /// The warehouse rejected `credential`; stop handing it out.
    async fn invalidate(&self, credential: &Credential);

    fn kind(&self) -> SourceKind;
}
