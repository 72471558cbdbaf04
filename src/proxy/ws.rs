//! WebSocket front-end for the proxy variant (spec §4.9). Unlike the TCP
//! front-end, an in-band `TLS` upgrade makes no sense here — a WebSocket
//! front-end that needs TLS terminates it at the HTTP layer (`wss://`)
//! before this code ever runs, so every `TLS` request is simply answered
//! `false`, matching `protocols.py`'s `SyncplayWSServerProtocol.handleTLS`
//! (which ignores its own factory's certificate option entirely).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use super::bridge;
use super::ProxyConfig;

/// Serves the WebSocket front-end on `listener` until the process exits.
pub async fn serve(listener: TcpListener, cfg: Arc<ProxyConfig>) {
    let app = Router::new()
        .route("/", get(upgrade_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(cfg);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(error) = axum::serve(listener, make_service).await {
        warn!(%error, "proxy: websocket front-end exited");
    }
}

async fn upgrade_handler(
    State(cfg): State<Arc<ProxyConfig>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer_addr, cfg))
}

async fn handle_socket(socket: WebSocket, peer_addr: SocketAddr, cfg: Arc<ProxyConfig>) {
    let peer_ip = peer_addr.ip().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (front_line_tx, front_line_rx) = mpsc::unbounded_channel::<String>();
    let read_task = tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if front_line_tx.send(trimmed.to_string()).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let (to_front_tx, mut to_front_rx) = mpsc::unbounded_channel::<String>();
    let write_task = tokio::spawn(async move {
        while let Some(line) = to_front_rx.recv().await {
            if ws_tx.send(Message::Text(line.into())).await.is_err() {
                break;
            }
        }
    });

    bridge::run(
        peer_ip,
        Vec::new(),
        front_line_rx,
        to_front_tx,
        cfg.upstream_host.clone(),
        cfg.upstream_port,
    )
    .await;

    read_task.abort();
    write_task.abort();
    debug!(%peer_addr, "proxy: websocket connection closed");
}
