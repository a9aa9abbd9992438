//! `quarry auth`: manage the saved OAuth token outside of a server run.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use quarry_auth::{AuthSession, CredentialSource, FileTokenStore, TokenStore};
use quarry_core::{AuthMode, QuarryConfig};

use crate::logging;
use crate::settings::ConfigArgs;

/// Credential commands.
#[derive(Debug, Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthSubcommand {
    /// Sign in with the OAuth flow and save the token.
    Login {
        #[command(flatten)]
        config: ConfigArgs,

        /// Sign in again even if a valid token is saved.
        #[arg(long)]
        force: bool,
    },

    /// Delete the saved OAuth token.
    Logout {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show which credentials would be used.
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

pub async fn execute(cmd: AuthCommand) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login { config, force } => login(config.load()?, force).await,
        AuthSubcommand::Logout { config } => logout(config.load()?).await,
        AuthSubcommand::Status { config } => status(config.load()?).await,
    }
}

fn require_oauth(config: &QuarryConfig) -> Result<()> {
    match config.auth_mode()? {
        AuthMode::OAuth => Ok(()),
        AuthMode::ServiceAccount { .. } => {
            bail!("OAuth is not enabled. Pass --oauth-flow or set BIGQUERY_OAUTH_FLOW=true")
        }
    }
}

async fn login(config: QuarryConfig, force: bool) -> Result<()> {
    require_oauth(&config)?;
    logging::init(&config.logging)?;

    let session = AuthSession::from_config(&config, CancellationToken::new())
        .await
        .context("Failed to set up OAuth")?;
    let Some(oauth) = session.oauth() else {
        bail!("OAuth is not the active credential source");
    };

    if force {
        oauth.reset().await.context("Failed to discard the saved token")?;
    }
    let credential = oauth.acquire().await.context("Sign-in failed")?;
    session.shutdown().await;

    println!("Signed in.");
    println!("  Token file: {}", config.oauth.token_file.display());
    if let Some(expires_at) = credential.expires_at() {
        println!("  Access token valid until {}", expires_at.to_rfc3339());
    }
    Ok(())
}

async fn logout(config: QuarryConfig) -> Result<()> {
    require_oauth(&config)?;

    let store = FileTokenStore::new(&config.oauth.token_file);
    store
        .clear()
        .await
        .with_context(|| format!("Failed to delete {}", store.path().display()))?;

    println!("Removed {}", store.path().display());
    Ok(())
}

async fn status(config: QuarryConfig) -> Result<()> {
    match config.auth_mode()? {
        AuthMode::ServiceAccount { key_file } => {
            println!("Credential source: service account");
            match key_file {
                Some(path) => println!("  Key file: {}", path.display()),
                None => println!("  Application default credentials"),
            }
        }
        AuthMode::OAuth => {
            println!("Credential source: OAuth");
            let store = FileTokenStore::new(&config.oauth.token_file);
            println!("  Token file: {}", store.path().display());
            match store.load().await {
                Some(token) => {
                    let state = if token.expires_at > Utc::now() {
                        "valid"
                    } else {
                        "expired, will be refreshed on next use"
                    };
                    println!(
                        "  Access token: {} (expires {})",
                        state,
                        token.expires_at.to_rfc3339()
                    );
                    if !token.scopes.is_empty() {
                        println!("  Scopes: {}", token.scopes.join(" "));
                    }
                }
                None => println!("  Not signed in. Run `quarry auth login`."),
            }
        }
    }
    Ok(())
}
