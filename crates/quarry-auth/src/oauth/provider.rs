//! Authorization code flow against Google's OAuth endpoints.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::callback::CallbackListener;
use super::client_secrets::ClientSecrets;
use super::pkce::{Pkce, generate_state};
use crate::endpoint::TokenEndpoint;
use crate::error::AuthError;
use crate::token::OAuthToken;

/// The network half of the OAuth source: interactive authorization and
/// refresh-token grants.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Run the interactive flow until the user grants or denies consent.
    async fn authorize(&self) -> Result<OAuthToken, AuthError>;

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AuthError>;
}

/// Shows the consent URL to the user.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str) -> Result<(), String>;
}

/// Opens the URL with the system's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> Result<(), String> {
        open::that_detached(url).map_err(|e| e.to_string())
    }
}

/// Installed-app flow with PKCE and a loopback redirect.
pub struct GoogleOAuthProvider {
    secrets: ClientSecrets,
    endpoint: TokenEndpoint,
    scopes: Vec<String>,
    callback_port: u16,
    browser: Option<Arc<dyn BrowserLauncher>>,
}

impl GoogleOAuthProvider {
    pub fn new(secrets: ClientSecrets, scopes: Vec<String>, http: reqwest::Client) -> Self {
        let endpoint = TokenEndpoint::new(http, secrets.token_uri.clone());
        Self {
            secrets,
            endpoint,
            scopes,
            callback_port: 0,
            browser: Some(Arc::new(SystemBrowser)),
        }
    }

    /// Listen for the redirect on a fixed port instead of an ephemeral one.
    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    /// Replace the browser launcher. `None` only prints the URL.
    pub fn with_browser(mut self, browser: Option<Arc<dyn BrowserLauncher>>) -> Self {
        self.browser = browser;
        self
    }

    /// Consent screen URL requesting offline access.
    pub fn authorization_url(&self, redirect_uri: &str, challenge: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&code_challenge={}&code_challenge_method=S256&state={}&access_type=offline&prompt=consent",
            self.secrets.auth_uri,
            urlencoding::encode(&self.secrets.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
            urlencoding::encode(challenge),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a token record.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken, AuthError> {
        let response = self
            .endpoint
            .grant(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", verifier),
                ("client_id", &self.secrets.client_id),
                ("client_secret", &self.secrets.client_secret),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        let scopes = response
            .granted_scopes()
            .unwrap_or_else(|| self.scopes.clone());
        let refresh_token = response
            .refresh_token
            .ok_or(AuthError::MissingRefreshToken)?;

        Ok(OAuthToken::new(
            response.access_token,
            refresh_token,
            response.expires_in,
            scopes,
        ))
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    #[instrument(skip(self))]
    async fn authorize(&self) -> Result<OAuthToken, AuthError> {
        let state = generate_state();
        let pkce = Pkce::generate();

        let listener = CallbackListener::bind(self.callback_port, state.clone()).await?;
        let redirect_uri = listener.redirect_uri();
        let url = self.authorization_url(&redirect_uri, &pkce.challenge, &state);

        eprintln!("To authorize BigQuery access, open this URL in a browser:\n\n    {url}\n");
        match &self.browser {
            Some(browser) => {
                if let Err(e) = browser.launch(&url) {
                    warn!(error = %e, "Could not open a browser, use the printed URL");
                }
            }
            None => info!("Browser launch disabled, waiting for the redirect"),
        }

        let code = listener.wait().await?;
        info!("Received authorization code, exchanging it for tokens");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri).await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_str()),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
        ];

        let response = match self.endpoint.grant(&form).await {
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Token refresh failed in transit, retrying once");
                self.endpoint.grant(&form).await?
            }
            other => other?,
        };

        Ok(token.refreshed(
            response.access_token,
            response.expires_in,
            response.refresh_token,
        ))
    }
}
