//! Service account and ambient default credentials.
//!
//! Resolution without an explicit key file follows the usual Google order:
//! `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file, then
//! the GCE metadata server.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::credential::{Credential, CredentialSource, SourceKind};
use crate::endpoint::{GOOGLE_TOKEN_URL, TokenEndpoint, TokenResponse};
use crate::error::AuthError;
use crate::token::EXPIRY_SAFETY_MARGIN;

/// Default metadata server root.
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct AuthorizedUserKey {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

enum Minter {
    Jwt {
        client_email: String,
        key_id: Option<String>,
        key: EncodingKey,
        endpoint: TokenEndpoint,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        endpoint: TokenEndpoint,
    },
    Metadata {
        http: reqwest::Client,
        base_url: String,
    },
}

/// Non-interactive credentials minted from a key, a gcloud user login or
/// the metadata server.
///
/// The minted access token is cached and re-minted once it enters the
/// expiry margin. Minting holds the cache lock, so concurrent callers
/// share one request.
pub struct ServiceAccountSource {
    minter: Minter,
    scopes: Vec<String>,
    origin: String,
    cached: Mutex<Option<Credential>>,
}

impl fmt::Debug for ServiceAccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountSource")
            .field("origin", &self.origin)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountSource {
    /// Load a `service_account` or `authorized_user` JSON file.
    ///
    /// An unreadable or malformed file is an error; callers treat it as fatal.
    pub fn from_key_file(
        path: &Path,
        scopes: Vec<String>,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| AuthError::InvalidKeyFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json, path, scopes, http)
    }

    /// Parse credentials JSON. `origin` is only used in errors and logs.
    pub fn from_json(
        json: &str,
        origin: &Path,
        scopes: Vec<String>,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let invalid = |reason: String| AuthError::InvalidKeyFile {
            path: origin.to_path_buf(),
            reason,
        };

        let file: CredentialsFile =
            serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

        let minter = match file {
            CredentialsFile::ServiceAccount(key) => {
                let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                    .map_err(|e| invalid(format!("private_key is not a valid RSA key: {e}")))?;
                Minter::Jwt {
                    client_email: key.client_email,
                    key_id: key.private_key_id,
                    key: encoding_key,
                    endpoint: TokenEndpoint::new(
                        http,
                        key.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                    ),
                }
            }
            CredentialsFile::AuthorizedUser(user) => Minter::AuthorizedUser {
                client_id: user.client_id,
                client_secret: user.client_secret,
                refresh_token: user.refresh_token,
                endpoint: TokenEndpoint::new(
                    http,
                    user.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                ),
            },
        };

        Ok(Self::with_minter(
            minter,
            scopes,
            origin.display().to_string(),
        ))
    }

    /// Credentials from the metadata server rooted at `base_url`.
    pub fn metadata(base_url: impl Into<String>, scopes: Vec<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into();
        let origin = format!("metadata server {base_url}");
        Self::with_minter(Minter::Metadata { http, base_url }, scopes, origin)
    }

    /// Resolve ambient default credentials.
    #[instrument(skip_all)]
    pub async fn from_environment(
        scopes: Vec<String>,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        if let Some(path) = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
        {
            tracing::info!(path = %path.display(), "Using GOOGLE_APPLICATION_CREDENTIALS");
            return Self::from_key_file(&path, scopes, http);
        }

        if let Some(path) = well_known_file().filter(|p| p.is_file()) {
            tracing::info!(path = %path.display(), "Using gcloud application default credentials");
            return Self::from_key_file(&path, scopes, http);
        }

        let base_url = std::env::var("GCE_METADATA_HOST")
            .map(|host| format!("http://{host}"))
            .unwrap_or_else(|_| METADATA_BASE_URL.to_string());
        if probe_metadata(&http, &base_url).await {
            tracing::info!(base_url = %base_url, "Using metadata server credentials");
            return Ok(Self::metadata(base_url, scopes, http));
        }

        Err(AuthError::NoDefaultCredentials(
            "set a key file or GOOGLE_APPLICATION_CREDENTIALS, run `gcloud auth application-default login`, or run on Google Cloud".to_string(),
        ))
    }

    fn with_minter(minter: Minter, scopes: Vec<String>, origin: String) -> Self {
        Self {
            minter,
            scopes,
            origin,
            cached: Mutex::new(None),
        }
    }

    /// Where the credentials come from, for logs.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[instrument(skip(self), fields(origin = %self.origin))]
    async fn mint(&self) -> Result<Credential, AuthError> {
        let response = match &self.minter {
            Minter::Jwt {
                client_email,
                key_id,
                key,
                endpoint,
            } => {
                let now = Utc::now().timestamp();
                let claims = AssertionClaims {
                    iss: client_email,
                    scope: self.scopes.join(" "),
                    aud: endpoint.token_url(),
                    iat: now,
                    exp: now + ASSERTION_LIFETIME_SECS,
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = key_id.clone();
                let assertion = jsonwebtoken::encode(&header, &claims, key)?;

                endpoint
                    .grant(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
                    .await?
            }
            Minter::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                endpoint,
            } => {
                endpoint
                    .grant(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                        ("refresh_token", refresh_token),
                    ])
                    .await?
            }
            Minter::Metadata { http, base_url } => {
                let url = format!(
                    "{}/computeMetadata/v1/instance/service-accounts/default/token?scopes={}",
                    base_url.trim_end_matches('/'),
                    urlencoding::encode(&self.scopes.join(","))
                );
                http.get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<TokenResponse>()
                    .await?
            }
        };

        tracing::debug!(expires_in = response.expires_in, "Minted access token");
        Ok(Credential::new(
            response.access_token,
            Some(Utc::now() + ChronoDuration::seconds(response.expires_in)),
        ))
    }
}

#[async_trait]
impl CredentialSource for ServiceAccountSource {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;

        let margin = ChronoDuration::seconds(EXPIRY_SAFETY_MARGIN.as_secs() as i64);
        if let Some(credential) = cached.as_ref() {
            let fresh = credential
                .expires_at()
                .is_none_or(|at| Utc::now() + margin < at);
            if fresh {
                return Ok(credential.clone());
            }
        }

        let credential = self.mint().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    async fn invalidate(&self, credential: &Credential) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref() == Some(credential) {
            tracing::info!(origin = %self.origin, "Discarding rejected access token");
            *cached = None;
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ServiceAccount
    }
}

fn well_known_file() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("CLOUDSDK_CONFIG").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(WELL_KNOWN_FILE));
    }

    #[cfg(windows)]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);
    #[cfg(not(windows))]
    let base = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"));

    base.map(|dir| dir.join("gcloud").join(WELL_KNOWN_FILE))
}

async fn probe_metadata(http: &reqwest::Client, base_url: &str) -> bool {
    let result = http
        .get(format!("{}/computeMetadata/v1/", base_url.trim_end_matches('/')))
        .header("Metadata-Flavor", "Google")
        .timeout(METADATA_PROBE_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(response) => response
            .headers()
            .get("Metadata-Flavor")
            .is_some_and(|v| v == "Google"),
        Err(e) => {
            tracing::debug!(error = %e, "Metadata server not reachable");
            false
        }
    }
}
