//! OAuth token record persisted between runs.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::credential::Credential;

/// Refresh this long before the provider's stated expiry.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Access and refresh token pair from an interactive authorization.
///
/// All four fields are written to the token file. `token` and `expiry`
/// are accepted as aliases for records written by the Google client
/// libraries. A record without an expiry loads as already expired, so its
/// refresh token is used on first access.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(alias = "token")]
    pub access_token: String,

    pub refresh_token: String,

    #[serde(alias = "expiry", default = "default_expires_at")]
    pub expires_at: DateTime<Utc>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_expires_at() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl OAuthToken {
    /// Build a token that expires `expires_in_secs` from now.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
            scopes,
        }
    }

    /// Whether the access token is expired or inside the safety margin.
    pub fn is_expired(&self) -> bool {
        let margin = ChronoDuration::seconds(EXPIRY_SAFETY_MARGIN.as_secs() as i64);
        Utc::now() + margin >= self.expires_at
    }

    /// Time left before the access token needs refreshing.
    pub fn time_until_expiry(&self) -> Duration {
        let margin = ChronoDuration::seconds(EXPIRY_SAFETY_MARGIN.as_secs() as i64);
        (self.expires_at - margin - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Apply a refresh response. The refresh token only changes when the
    /// provider rotated it.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        expires_in_secs: i64,
        rotated_refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: rotated_refresh_token.unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
            scopes: self.scopes.clone(),
        }
    }

    /// Bearer credential for warehouse calls.
    pub fn credential(&self) -> Credential {
        Credential::new(self.access_token.clone(), Some(self.expires_at))
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}
