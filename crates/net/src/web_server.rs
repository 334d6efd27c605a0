use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use session::ConnId;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::channels::{ConnWriteRx, CoordEvent, CoordTx, RouterControl, RouterControlTx};
use crate::protocol::ClientMessage;

/// Shared state for the axum WebSocket handler.
#[derive(Clone)]
struct AppState {
    next_conn_id: Arc<AtomicU64>,
    coord_tx: CoordTx,
    router_tx: RouterControlTx,
}

/// Run the web server: `/ws` upgrades to the coordination protocol, and if
/// `static_dir` is Some the browser client is served from it (SPA fallback
/// to index.html).
pub async fn run_web_server(
    addr: String,
    coord_tx: CoordTx,
    router_tx: RouterControlTx,
    static_dir: Option<PathBuf>,
) -> Result<(), std::io::Error> {
    run_web_server_inner(addr, coord_tx, router_tx, static_dir, None).await
}

/// Run the web server with graceful shutdown.
pub async fn run_web_server_with_shutdown(
    addr: String,
    coord_tx: CoordTx,
    router_tx: RouterControlTx,
    static_dir: Option<PathBuf>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    run_web_server_inner(addr, coord_tx, router_tx, static_dir, Some(shutdown_rx)).await
}

async fn run_web_server_inner(
    addr: String,
    coord_tx: CoordTx,
    router_tx: RouterControlTx,
    static_dir: Option<PathBuf>,
    shutdown_rx: Option<tokio::sync::watch::Receiver<bool>>,
) -> Result<(), std::io::Error> {
    let state = AppState {
        next_conn_id: Arc::new(AtomicU64::new(1)),
        coord_tx,
        router_tx,
    };

    let mut app = Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(dir) = static_dir {
        let index_path = dir.join("index.html");
        let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(index_path));
        app = app.fallback_service(serve_dir);
        tracing::info!(dir = %dir.display(), "Serving static files");
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Web server listening on {}", addr);

    if let Some(mut rx) = shutdown_rx {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                tracing::info!("Web server shutting down gracefully");
            })
            .await
            .map_err(std::io::Error::other)
    } else {
        axum::serve(listener, app)
            .await
            .map_err(std::io::Error::other)
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let conn_id = ConnId(state.next_conn_id.fetch_add(1, Ordering::Relaxed));
    tracing::info!(?conn_id, "New WebSocket connection");

    let (mut ws_writer, mut ws_reader) = socket.split();

    // Per-connection write channel, registered with the output router.
    let (write_tx, mut write_rx): (_, ConnWriteRx) = tokio::sync::mpsc::unbounded_channel();
    let _ = state
        .router_tx
        .send(RouterControl::Register { conn_id, write_tx });
    let _ = state.coord_tx.send(CoordEvent::Connected { conn_id });

    // Writer task: forward routed outputs as WS text frames.
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = write_rx.recv().await {
            if ws_writer.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: parse commands and hand them to the coordinator.
    while let Some(result) = ws_reader.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Some(msg) = parse_client_message(conn_id, &text) {
                    let _ = state.coord_tx.send(CoordEvent::Command { conn_id, msg });
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) => {
                // axum replies with pong automatically
            }
            Ok(_) => {} // Ignore binary, pong, etc.
            Err(e) => {
                tracing::debug!(?conn_id, "WebSocket read error: {}", e);
                break;
            }
        }
    }

    // Loss detection: the coordinator decides whether this starts a grace
    // window or is a stranger disconnecting.
    let _ = state.coord_tx.send(CoordEvent::Disconnected { conn_id });
    let _ = state.router_tx.send(RouterControl::Unregister { conn_id });

    writer_handle.abort();
    tracing::info!(?conn_id, "WebSocket connection ended");
}

/// Parse a WebSocket text frame into a ClientMessage. Malformed frames are
/// logged and dropped; the connection stays open.
pub(crate) fn parse_client_message(conn_id: ConnId, text: &str) -> Option<ClientMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!(?conn_id, "Invalid client message: {}", e);
            None
        }
    }
}
