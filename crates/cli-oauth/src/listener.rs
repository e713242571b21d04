use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::loopback_redirect_uri;
use crate::error::ListenerError;

/// How long [`CallbackListener::close`] waits for in-flight responses
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Query parameters of the authorization redirect.
///
/// `code` is empty when the redirect carried no code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl AuthorizationResponse {
    /// Parse a redirect query string. The first occurrence of each parameter
    /// wins; unknown parameters and undecodable bytes are tolerated.
    pub fn from_query(query: &str) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut code,
                "state" => &mut state,
                "error" => &mut error,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Self {
            code: code.unwrap_or_default(),
            state,
            error,
        }
    }
}

struct CallbackState {
    code_tx: Mutex<Option<oneshot::Sender<AuthorizationResponse>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallbackState {
    fn take_code_tx(&self) -> Option<oneshot::Sender<AuthorizationResponse>> {
        self.code_tx.lock().ok().and_then(|mut slot| slot.take())
    }

    fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = tx.send(());
        }
    }
}

/// One-shot loopback HTTP server that catches the authorization redirect.
///
/// The first request on any path is delivered through the receiver returned
/// by [`start`](Self::start) and triggers shutdown of the listening socket.
/// Requests that race in after that get `410 Gone`. Dropping the listener
/// aborts the server task, releasing the port on every exit path.
pub struct CallbackListener {
    local_addr: SocketAddr,
    state: Arc<CallbackState>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:port` and start serving. Port 0 picks a free port.
    pub async fn start(
        port: u16,
    ) -> Result<(Self, oneshot::Receiver<AuthorizationResponse>), ListenerError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(CallbackState {
            code_tx: Mutex::new(Some(code_tx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        });

        let app = Router::new()
            .fallback(handle_callback)
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "callback listener failed");
            }
            debug!(%local_addr, "callback listener closed");
        });

        info!(%local_addr, "callback listener started");
        Ok((
            Self {
                local_addr,
                state,
                server,
            },
            code_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI that reaches this listener
    pub fn redirect_uri(&self) -> String {
        loopback_redirect_uri(self.local_addr.port())
    }

    /// Whether the server task has finished and the socket is released
    pub fn is_closed(&self) -> bool {
        self.server.is_finished()
    }

    /// Stop accepting, let in-flight responses finish, then release the port
    pub async fn close(mut self) {
        self.state.shutdown();
        if tokio::time::timeout(CLOSE_GRACE, &mut self.server)
            .await
            .is_err()
        {
            debug!("callback listener did not drain in time, aborting");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.state.shutdown();
        self.server.abort();
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let plain = [(header::CONTENT_TYPE, "text/plain; charset=utf-8")];

    let Some(code_tx) = state.take_code_tx() else {
        debug!("rejecting redirect after a code was already delivered");
        return (
            StatusCode::GONE,
            plain,
            "An authorization response was already received.\r\n".to_string(),
        );
    };

    let params = AuthorizationResponse::from_query(query.as_deref().unwrap_or_default());
    let body = match &params.error {
        Some(error) => format!(
            "Authorization failed: {}\r\nYou can close this browser window.",
            error
        ),
        None => format!(
            "Received code: {}\r\nYou can now safely close this browser window.",
            params.code
        ),
    };

    if code_tx.send(params).is_err() {
        debug!("authorization flow stopped waiting before the redirect arrived");
    }
    state.shutdown();

    (StatusCode::OK, plain, body)
}
