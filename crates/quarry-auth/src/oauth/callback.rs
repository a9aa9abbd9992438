//! Short-lived loopback listener that receives the authorization redirect.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

/// Path the provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Quarry</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to your client.</p></body></html>";

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type Outcome = Result<String, AuthError>;

struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// Loopback HTTP listener bound to 127.0.0.1 for one authorization.
///
/// The first request to [`CALLBACK_PATH`] carrying a `code` or an `error`
/// decides the outcome; requests with neither are answered and ignored.
/// The server stops when the listener is dropped.
pub struct CallbackListener {
    addr: SocketAddr,
    receiver: oneshot::Receiver<Outcome>,
    shutdown: CancellationToken,
}

impl CallbackListener {
    /// Bind on `port` (0 for an ephemeral port) and start serving.
    pub async fn bind(port: u16, expected_state: impl Into<String>) -> Result<Self, AuthError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| AuthError::Callback(format!("failed to bind 127.0.0.1:{port}: {e}")))?;
        let addr = listener.local_addr()?;

        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state: expected_state.into(),
            sender: Mutex::new(Some(sender)),
        });
        let router = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "OAuth callback listener failed");
            }
        });

        tracing::debug!(addr = %addr, "OAuth callback listener started");
        Ok(Self {
            addr,
            receiver,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI to register with the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), CALLBACK_PATH)
    }

    /// Wait for the redirect and return the authorization code.
    pub async fn wait(mut self) -> Result<String, AuthError> {
        (&mut self.receiver)
            .await
            .map_err(|_| AuthError::Callback("listener stopped before a redirect arrived".to_string()))?
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if params.code.is_none() && params.error.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Html(failure_page("waiting for an authorization redirect")),
        );
    }

    let Some(sender) = state.sender.lock().await.take() else {
        return (
            StatusCode::GONE,
            Html(failure_page("this authorization request was already completed")),
        );
    };

    let outcome = evaluate(params, &state.expected_state);
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE.to_string())),
        Err(e) => (StatusCode::BAD_REQUEST, Html(failure_page(&e.to_string()))),
    };
    let _ = sender.send(outcome);
    response
}

fn evaluate(params: CallbackParams, expected_state: &str) -> Outcome {
    if let Some(error) = params.error {
        let reason = match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(AuthError::AuthorizationDenied(reason));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::AuthorizationDenied("redirect carried no code".to_string()))
}

fn failure_page(reason: &str) -> String {
    let escaped = reason
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!doctype html><html><head><title>Quarry</title></head>\
<body><h1>Authorization failed</h1><p>{escaped}</p></body></html>"
    )
}
