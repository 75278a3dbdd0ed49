//! Ephemeral local endpoint for the browser-extension handshake.
//!
//! The server binds `127.0.0.1` on an OS-chosen port and accepts
//! `POST /callback` with `{"cookies": "...", "handle": "..."}`. The first valid
//! payload is handed to [`CallbackServer::wait`]; later valid payloads are
//! acknowledged and dropped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, instrument, warn};

use super::LoginError;
use crate::transport::TransportError;

/// Path the extension posts to.
pub const CALLBACK_PATH: &str = "/callback";

/// Bound on how long in-flight requests may take to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Payload posted by the browser extension.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackPayload {
    /// Raw `document.cookie` string.
    #[serde(default)]
    pub cookies: String,
    /// Handle shown on the judge's page.
    #[serde(default)]
    pub handle: String,
}

impl std::fmt::Debug for CallbackPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPayload")
            .field("cookies", &"[REDACTED]")
            .field("handle", &self.handle)
            .finish()
    }
}

/// Lifecycle of a [`CallbackServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    /// Bound but not serving.
    Idle,
    /// Accepting requests.
    Listening,
    /// A payload was delivered to the waiter.
    PayloadReceived,
    /// The deadline elapsed first.
    TimedOut,
    /// The server failed before a payload arrived.
    TransportError,
    /// Shut down; the port is released.
    Stopped,
}

/// Single-slot handoff shared with the request handler.
struct Handoff {
    sender: Mutex<Option<oneshot::Sender<CallbackPayload>>>,
}

/// Local HTTP server receiving captured cookies from the extension.
pub struct CallbackServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    handoff: Arc<Handoff>,
    receiver: Option<oneshot::Receiver<CallbackPayload>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<std::io::Result<()>>>,
    state: CallbackState,
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CallbackServer {
    /// Binds `127.0.0.1:0`.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Transport`] if the socket cannot be bound.
    pub async fn bind() -> Result<Self, LoginError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(TransportError::Io)?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;
        let (sender, receiver) = oneshot::channel();

        debug!(%local_addr, "callback server bound");
        Ok(Self {
            listener: Some(listener),
            local_addr,
            handoff: Arc::new(Handoff {
                sender: Mutex::new(Some(sender)),
            }),
            receiver: Some(receiver),
            shutdown: CancellationToken::new(),
            task: None,
            state: CallbackState::Idle,
        })
    }

    /// Port the server is bound to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CallbackState {
        self.state
    }

    /// Starts serving in the background. Calling it again is a no-op.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        let router = router(Arc::clone(&self.handoff));
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }));
        self.state = CallbackState::Listening;
        info!(port = self.port(), "callback server listening");
    }

    /// Waits up to `deadline` for the first valid payload, then shuts down.
    ///
    /// The server is stopped on every return path.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Timeout`] when the deadline elapses and
    /// [`LoginError::Transport`] when the server fails first or was never
    /// started.
    #[instrument(level = "debug", skip(self), fields(port = self.port()))]
    pub async fn wait(&mut self, deadline: Duration) -> Result<CallbackPayload, LoginError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(already_consumed().into());
        };
        if self.task.is_none() {
            self.stop().await;
            return Err(already_consumed().into());
        }

        let outcome = match tokio::time::timeout(deadline, receiver).await {
            Ok(Ok(payload)) => {
                self.state = CallbackState::PayloadReceived;
                Ok(payload)
            }
            Ok(Err(_closed)) => {
                self.state = CallbackState::TransportError;
                Err(self.server_failure().await.into())
            }
            Err(_elapsed) => {
                self.state = CallbackState::TimedOut;
                warn!(secs = deadline.as_secs(), "timed out waiting for the extension");
                Err(LoginError::Timeout(deadline))
            }
        };

        self.stop().await;
        outcome
    }

    /// Stops accepting connections and lets in-flight requests finish.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        self.listener = None;
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(error))) => debug!(error = %error, "callback server exited with error"),
                Ok(Err(join_error)) => debug!(error = %join_error, "callback server task failed"),
                Err(_elapsed) => {
                    warn!("callback server did not drain in time; aborting");
                    task.abort();
                }
            }
        }
        self.state = CallbackState::Stopped;
        debug!("callback server stopped");
    }

    async fn server_failure(&mut self) -> TransportError {
        let Some(task) = self.task.take() else {
            return already_consumed();
        };
        match task.await {
            Ok(Err(error)) => TransportError::Io(error),
            Ok(Ok(())) => TransportError::Io(std::io::Error::other("callback server exited")),
            Err(join_error) => TransportError::Io(std::io::Error::other(join_error.to_string())),
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn already_consumed() -> TransportError {
    TransportError::Io(std::io::Error::other(
        "callback server is not running or was already waited on",
    ))
}

fn router(handoff: Arc<Handoff>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(CALLBACK_PATH, post(receive_callback).options(preflight))
        .layer(cors)
        .with_state(handoff)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn receive_callback(State(handoff): State<Arc<Handoff>>, body: Bytes) -> Response {
    let payload: CallbackPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            debug!(error = %error, "rejecting malformed callback body");
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };
    if payload.cookies.is_empty() || payload.handle.is_empty() {
        debug!("rejecting callback with missing fields");
        return (StatusCode::BAD_REQUEST, "Missing data").into_response();
    }

    let sender = handoff
        .sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match sender {
        Some(sender) => {
            info!(handle = %payload.handle, "received session from the browser extension");
            if sender.send(payload).is_err() {
                debug!("callback waiter is gone; payload dropped");
            }
        }
        None => debug!(handle = %payload.handle, "duplicate callback ignored"),
    }

    Json(serde_json::json!({ "status": "ok" })).into_response()
}
