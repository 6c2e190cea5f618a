//! Development server with live reload
//!
//! Serves the source tree over HTTP, injects a small live-reload client into
//! HTML responses, and pushes [`ReloadEvent`]s from the file watcher to every
//! connected browser over a WebSocket.

pub mod inject;
pub mod reload;

pub use inject::{inject_client, LIVERELOAD_PATH};
pub use reload::{ReloadEvent, ReloadHub};

use crate::build::BuildContext;
use crate::tasks::{TaskError, TaskOutput};
use crate::watch::watch_source;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared state of the development server.
pub struct ServerState {
    /// Directory served at `/`
    root: PathBuf,
    hub: ReloadHub,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerState {
    pub fn new(root: PathBuf, hub: ReloadHub) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { root, hub, shutdown_tx }
    }

    /// Tell open WebSocket connections to close.
    pub fn close_clients(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Build the server's router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback(static_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /__sitepipe/livereload
async fn livereload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let events = state.hub.subscribe();
    let shutdown = state.shutdown_tx.subscribe();
    ws.on_upgrade(move |socket| handle_client(socket, events, shutdown))
}

/// Forward reload events to one browser until either side goes away.
async fn handle_client(
    socket: WebSocket,
    mut events: broadcast::Receiver<ReloadEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    debug!("Live-reload client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Live-reload client fell behind, forcing a reload");
                        ReloadEvent::Reload
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to encode reload event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    debug!("Live-reload client disconnected");
}

/// Serve a file from the root; HTML gets the live-reload client.
async fn static_handler(State(state): State<Arc<ServerState>>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    let Some(relative) = request_path(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(html_path) = html_file(&state.root, &relative, path.ends_with('/')) {
        return match tokio::fs::read_to_string(&html_path).await {
            Ok(html) => (
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                inject_client(&html),
            )
                .into_response(),
            Err(e) => {
                warn!(path = %html_path.display(), error = %e, "Failed to read HTML");
                StatusCode::NOT_FOUND.into_response()
            }
        };
    }

    match ServeDir::new(&state.root).oneshot(req).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    }
}

/// Request path as a relative filesystem path, rejecting traversal.
fn request_path(uri_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for segment in uri_path.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." || segment.contains('\\') {
            return None;
        }
        relative.push(segment);
    }

    if relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        Some(relative)
    } else {
        None
    }
}

/// The HTML file a request resolves to, if any.
fn html_file(root: &Path, relative: &Path, is_dir_request: bool) -> Option<PathBuf> {
    let candidate = root.join(relative);

    if candidate.is_dir() {
        // ServeDir redirects `/dir` to `/dir/` first
        let index = candidate.join("index.html");
        return (is_dir_request && index.is_file()).then_some(index);
    }

    let is_html = candidate
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));

    (is_html && candidate.is_file()).then_some(candidate)
}

/// `serve`: run the server and watcher until Ctrl+C.
pub fn serve(context: &BuildContext) -> Result<TaskOutput, TaskError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| TaskError::Server(format!("failed to start runtime: {}", e)))?;
    runtime.block_on(run_server(context.clone()))?;
    Ok(TaskOutput::new())
}

/// Bind, serve and watch until Ctrl+C.
pub async fn run_server(context: BuildContext) -> Result<(), TaskError> {
    let root = context.src_dir();
    let server = &context.config().server;
    let addr = format!("{}:{}", server.host, server.port);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| TaskError::Server(format!("cannot bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr().map_err(|e| TaskError::Server(e.to_string()))?;

    let state = Arc::new(ServerState::new(root.clone(), ReloadHub::new()));
    let stop_watching = Arc::new(AtomicBool::new(false));

    let watcher = {
        let hub = state.hub.clone();
        let stop_watching = Arc::clone(&stop_watching);
        tokio::task::spawn_blocking(move || {
            let result = watch_source(context, &stop_watching, |event| {
                let clients = hub.publish(event.clone());
                debug!(clients, ?event, "Published reload event");
            });
            if let Err(e) = result {
                error!("Watcher stopped: {}", e);
            }
        })
    };

    info!("Serving {} at http://{}", root.display(), local_addr);

    let served = axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await;

    stop_watching.store(true, Ordering::SeqCst);
    if let Err(e) = watcher.await {
        warn!("Watcher task panicked: {}", e);
    }

    served.map_err(|e| TaskError::Server(e.to_string()))
}

async fn shutdown_signal(state: Arc<ServerState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    state.close_clients();
}
