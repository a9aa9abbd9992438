//! # quarry-auth
//!
//! Credential acquisition for Quarry.
//!
//! Exactly one strategy is active per process:
//!
//! | Strategy | Source | Notes |
//! |----------|--------|-------|
//! | **Service account** | [`ServiceAccountSource`] | Key file, gcloud user credentials, or the metadata server |
//! | **OAuth** | [`OAuthSource`] | Browser consent once, then refresh tokens from a [`TokenStore`] |
//!
//! Both implement [`CredentialSource`]. Acquisition is single flight: when
//! a token needs minting, refreshing or an interactive login, one caller
//! does the work and the rest reuse its result.

pub mod credential;
pub mod endpoint;
pub mod error;
pub mod oauth;
pub mod service_account;
pub mod session;
pub mod store;
pub mod token;

pub use credential::{Credential, CredentialSource, SourceKind};
pub use error::AuthError;
pub use oauth::{OAuthPhase, OAuthSource};
pub use service_account::ServiceAccountSource;
pub use session::AuthSession;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::OAuthToken;
