//! Interactive OAuth 2.0 installed-app flow.

pub mod callback;
pub mod client_secrets;
pub mod pkce;
pub mod provider;
pub mod source;

pub use callback::CallbackListener;
pub use client_secrets::ClientSecrets;
pub use provider::{BrowserLauncher, GoogleOAuthProvider, OAuthProvider, SystemBrowser};
pub use source::{OAuthPhase, OAuthSource};
