//! HTTP channel adapter: `POST /invoke` request/response over axum.
//!
//! Each request becomes one [`ChannelEvent`] on the bus with a fresh
//! `web:<request id>` channel id; the handler waits for the matching
//! [`AgentResponse`] and turns it into the HTTP reply. Every request owns a
//! cancellation token that fires when the handler gives up or the client
//! goes away; the agent loop fetches it with [`WebAdapter::turn_token`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use dashmap::DashMap;
use proto::{AgentResponse, ChannelError, ChannelEvent, ChannelId, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::ChannelAdapter;

const EMPTY_INPUT_REPLY: &str = "Пустой запрос: напишите, пожалуйста, ваш вопрос.";
const UNAVAILABLE_REPLY: &str = "Сервис временно недоступен. Попробуйте еще раз позже.";

/// Body of `POST /invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub user_input: String,
    /// Conversation to continue; a new one is started when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Reply of `POST /invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub assistant_message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A request waiting for its turn to finish.
struct PendingRequest {
    reply: oneshot::Sender<AgentResponse>,
    cancel: CancellationToken,
}

type PendingRequests = Arc<DashMap<String, PendingRequest>>;

/// Shared state for the axum handlers.
struct WebState {
    event_tx: mpsc::Sender<ChannelEvent>,
    pending: PendingRequests,
    shutdown: CancellationToken,
    reply_timeout: Duration,
}

/// Web channel adapter: runs the HTTP endpoint.
#[derive(Clone)]
pub struct WebAdapter {
    host: String,
    port: u16,
    cors_origins: String,
    reply_timeout: Duration,
    shutdown: CancellationToken,
    /// Requests waiting for their agent response, keyed by request id.
    pending: PendingRequests,
}

impl WebAdapter {
    /// Creates a new web adapter listening on all interfaces.
    pub fn new(port: u16, cors_origins: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            cors_origins: cors_origins.into(),
            reply_timeout: Duration::from_secs(300),
            shutdown: CancellationToken::new(),
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Upper bound on how long a request waits for its turn to finish.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Token that stops the server gracefully when cancelled. Cancelling it
    /// also cancels every in-flight turn.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancellation token for the turn answering `channel_id`.
    ///
    /// A request that is no longer waiting gets an already cancelled token,
    /// so its turn never starts.
    pub fn turn_token(&self, channel_id: &ChannelId) -> CancellationToken {
        if let Some(pending) = self.pending.get(request_id(channel_id)) {
            return pending.cancel.clone();
        }
        let token = CancellationToken::new();
        token.cancel();
        token
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Builds the CORS layer from the configured origins string.
    fn build_cors(&self) -> CorsLayer {
        if self.cors_origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = self
                .cors_origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }

    /// Router with all endpoints, without binding a socket.
    pub fn router(&self, tx: mpsc::Sender<ChannelEvent>) -> Router {
        let state = Arc::new(WebState {
            event_tx: tx,
            pending: Arc::clone(&self.pending),
            shutdown: self.shutdown.clone(),
            reply_timeout: self.reply_timeout,
        });

        Router::new()
            .route("/invoke", post(invoke_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(self.build_cors())
    }
}

#[async_trait]
impl ChannelAdapter for WebAdapter {
    fn channel_id(&self) -> ChannelId {
        ChannelId::new("web", "server")
    }

    async fn run(self, tx: mpsc::Sender<ChannelEvent>) -> Result<(), ChannelError> {
        info!(port = self.port, "Web adapter starting");

        let app = self.router(tx);
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("bind failed: {e}")))?;

        info!(host = %self.host, port = self.port, "Web adapter listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("server error: {e}")))?;

        info!("Web adapter stopped");
        Ok(())
    }

    async fn send_response(&self, resp: AgentResponse) -> Result<(), ChannelError> {
        let request_id = request_id(&resp.channel_id).to_string();

        let Some((_, pending)) = self.pending.remove(&request_id) else {
            return Err(ChannelError::SendFailed(format!(
                "no pending request for {}",
                resp.channel_id
            )));
        };
        pending.reply.send(resp).map_err(|_| {
            debug!(request = %request_id, "Request abandoned before its reply");
            ChannelError::Closed
        })
    }
}

fn request_id(channel_id: &ChannelId) -> &str {
    channel_id.as_str().strip_prefix("web:").unwrap_or_default()
}

// ─── Axum handlers ─────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "ok"
}

fn reply(
    status: StatusCode,
    message: impl Into<String>,
    session_id: Option<&SessionId>,
) -> (StatusCode, Json<InvokeResponse>) {
    (
        status,
        Json(InvokeResponse {
            assistant_message: message.into(),
            session_id: session_id.map(|s| s.to_string()),
        }),
    )
}

async fn invoke_handler(
    State(state): State<Arc<WebState>>,
    Json(body): Json<InvokeRequest>,
) -> (StatusCode, Json<InvokeResponse>) {
    let user_input = body.user_input.trim();
    if user_input.is_empty() {
        return reply(StatusCode::BAD_REQUEST, EMPTY_INPUT_REPLY, None);
    }

    let session_id = body
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionId::from)
        .unwrap_or_default();

    let request_id = Uuid::new_v4().to_string();
    let (reply_tx, reply_rx) = oneshot::channel();
    let cancel = state.shutdown.child_token();
    state.pending.insert(
        request_id.clone(),
        PendingRequest {
            reply: reply_tx,
            cancel: cancel.clone(),
        },
    );
    // Fires on every exit path, including the client dropping the connection.
    let _cancel_turn = cancel.drop_guard();

    let event = ChannelEvent::new(
        ChannelId::new("web", &request_id),
        session_id.clone(),
        user_input,
    );
    debug!(request = %request_id, session = %session_id, "Forwarding /invoke");
    if state.event_tx.send(event).await.is_err() {
        state.pending.remove(&request_id);
        warn!("Agent event bus closed");
        return reply(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_REPLY, Some(&session_id));
    }

    match tokio::time::timeout(state.reply_timeout, reply_rx).await {
        Ok(Ok(resp)) if resp.is_error => {
            reply(StatusCode::BAD_GATEWAY, resp.content, Some(&session_id))
        }
        Ok(Ok(resp)) => reply(StatusCode::OK, resp.content, Some(&session_id)),
        Ok(Err(_)) => {
            warn!(request = %request_id, "Response sender dropped");
            reply(StatusCode::BAD_GATEWAY, UNAVAILABLE_REPLY, Some(&session_id))
        }
        Err(_) => {
            state.pending.remove(&request_id);
            warn!(request = %request_id, "Timed out waiting for agent response");
            reply(StatusCode::GATEWAY_TIMEOUT, UNAVAILABLE_REPLY, Some(&session_id))
        }
    }
}
