//! Loopback HTTP server receiving the OAuth redirect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Router, http::StatusCode};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

use crate::error::DebateError;

pub const CALLBACK_PATH: &str = "/callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCallback {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type Outcome = Result<OAuthCallback, String>;

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    callback_tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

/// A bound loopback listener. Binding happens before the browser is opened
/// so the redirect cannot race the server.
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    pub async fn bind(port: u16) -> Result<Self, DebateError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DebateError::Auth(format!("failed to bind callback server at {addr}: {e}")))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DebateError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn redirect_uri(&self) -> Result<String, DebateError> {
        Ok(format!("http://{}{}", self.local_addr()?, CALLBACK_PATH))
    }

    /// Serve until one valid callback arrives, the user denies consent, or
    /// `timeout` elapses.
    pub async fn wait(self, expected_state: impl Into<String>, timeout: Duration) -> Result<OAuthCallback, DebateError> {
        let (callback_tx, callback_rx) = oneshot::channel::<Outcome>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app_state = CallbackState {
            expected_state: expected_state.into(),
            callback_tx: Arc::new(Mutex::new(Some(callback_tx))),
        };

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(app_state);

        let server_task = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match tokio::time::timeout(timeout, callback_rx).await {
            Ok(Ok(Ok(callback))) => Ok(callback),
            Ok(Ok(Err(reason))) => Err(DebateError::Auth(format!("authorization denied: {reason}"))),
            Ok(Err(_)) => Err(DebateError::Auth("callback server stopped before receiving a code".to_string())),
            Err(_) => Err(DebateError::Auth("timed out waiting for the browser sign-in".to_string())),
        };

        let _ = shutdown_tx.send(());
        let _ = server_task.await;

        outcome
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = query.error.clone().filter(|e| !e.is_empty()) {
        if let Some(tx) = state.callback_tx.lock().await.take() {
            let _ = tx.send(Err(error));
        }
        return (
            StatusCode::OK,
            Html("<h1>Sign-in cancelled</h1><p>You can close this window.</p>"),
        )
            .into_response();
    }

    match validate_callback(query, &state.expected_state) {
        Ok(callback) => {
            if let Some(tx) = state.callback_tx.lock().await.take() {
                let _ = tx.send(Ok(callback));
            }
            (
                StatusCode::OK,
                Html("<h1>Signed in to Agora</h1><p>You can close this window and return to the terminal.</p>"),
            )
                .into_response()
        }
        Err((status, message)) => (status, Html(message)).into_response(),
    }
}

fn validate_callback(query: CallbackQuery, expected_state: &str) -> Result<OAuthCallback, (StatusCode, String)> {
    let code = query
        .code
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing OAuth code".to_string()))?;
    let state = query
        .state
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing OAuth state".to_string()))?;

    if state != expected_state {
        return Err((StatusCode::UNAUTHORIZED, "state mismatch for OAuth callback".to_string()));
    }

    Ok(OAuthCallback { code, state })
}
