use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::{
    cancelled_request, duplicate_request_response, invalid_request_response, parse_error_response,
    request_key, Incoming, McpServer,
};

pub const SSE_PATH: &str = "/sse";
pub const MESSAGE_PATH: &str = "/message";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type Sessions = Arc<Mutex<HashMap<Uuid, Arc<Session>>>>;

struct Session {
    tx: mpsc::UnboundedSender<Value>,
    in_flight: Mutex<HashMap<String, AbortHandle>>,
}

impl Session {
    fn send(&self, message: Value) {
        if self.tx.send(message).is_err() {
            debug!("SSE stream already closed, dropping message");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("SSE session mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

#[derive(Clone)]
pub struct SseState {
    server: McpServer,
    sessions: Sessions,
}

impl SseState {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn session(&self, id: &Uuid) -> Option<Arc<Session>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Drop every session so open streams end and graceful shutdown can finish
    pub fn close_all(&self) {
        let sessions: Vec<_> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in sessions {
            for (_, handle) in lock(&session.in_flight).drain() {
                handle.abort();
            }
        }
    }
}

/// Removes the session and aborts its running calls once the client goes away
struct SessionGuard {
    id: Uuid,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.sessions).remove(&self.id) {
            for (_, handle) in lock(&session.in_flight).drain() {
                handle.abort();
            }
        }
        info!("SSE session {} closed", self.id);
    }
}

/// Keeps the session guard alive exactly as long as the response stream
struct GuardedSseStream<S> {
    stream: Pin<Box<S>>,
    _guard: SessionGuard,
}

impl<S> GuardedSseStream<S> {
    fn new(stream: S, guard: SessionGuard) -> Self {
        Self {
            stream: Box::pin(stream),
            _guard: guard,
        }
    }
}

impl<S, T, E> Stream for GuardedSseStream<S>
where
    S: Stream<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

pub fn create_router(state: SseState) -> Router {
    Router::new()
        .route(SSE_PATH, get(sse_handler))
        .route(MESSAGE_PATH, post(message_handler))
        .with_state(state)
}

async fn sse_handler(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();

    lock(&state.sessions).insert(
        id,
        Arc::new(Session {
            tx,
            in_flight: Mutex::new(HashMap::new()),
        }),
    );
    info!("SSE session {} opened", id);

    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
    };

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?sessionId={}", MESSAGE_PATH, id));
    let messages = UnboundedReceiverStream::new(rx).map(|message| {
        Ok::<_, Infallible>(Event::default().event("message").data(message.to_string()))
    });
    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);

    Sse::new(GuardedSseStream::new(stream, guard)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Uuid,
}

async fn message_handler(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(session) = state.session(&query.session_id) else {
        debug!("Message for unknown session {}", query.session_id);
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };

    let message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable message on session {}: {}", query.session_id, e);
            return (StatusCode::BAD_REQUEST, Json(parse_error_response(&e))).into_response();
        }
    };

    match Incoming::classify(message) {
        Incoming::Request { id, method, params } => {
            let key = request_key(&id);

            // Hold the lock across spawn so the task cannot finish before it is registered
            let mut in_flight = lock(&session.in_flight);
            if in_flight.contains_key(&key) {
                warn!(
                    "Rejecting request {} on session {}: id already in flight",
                    key, query.session_id
                );
                drop(in_flight);
                session.send(duplicate_request_response(id));
                return StatusCode::ACCEPTED.into_response();
            }

            let server = state.server.clone();
            let task_session = session.clone();
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let response = server.handle_request(id, &method, params).await;
                lock(&task_session.in_flight).remove(&task_key);
                task_session.send(response);
            });
            in_flight.insert(key, handle.abort_handle());
        }
        Incoming::Notification { method, params } => {
            if let Some(key) = cancelled_request(&method, params.as_ref()) {
                if let Some(handle) = lock(&session.in_flight).remove(&key) {
                    info!("Cancelling request {} on session {}", key, query.session_id);
                    handle.abort();
                }
            }
        }
        Incoming::Invalid { id } => session.send(invalid_request_response(id)),
        Incoming::Ignored => {}
    }

    StatusCode::ACCEPTED.into_response()
}

/// Serve MCP over HTTP+SSE on `addr` until Ctrl-C
pub async fn serve_sse(server: McpServer, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "SSE server listening on http://{}{}",
        listener.local_addr()?,
        SSE_PATH
    );

    let state = SseState::new(server);
    let app = create_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            crate::server::shutdown_signal().await;
            info!("Shutdown requested, closing {} SSE sessions", state.session_count());
            state.close_all();
        })
        .await?;
    Ok(())
}
