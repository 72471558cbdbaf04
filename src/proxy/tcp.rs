//! TCP front-end for the proxy variant: accepts plain (or TLS-upgraded)
//! client connections and bridges each to its own upstream connection.
//! Grounded in `protocols.py`'s `SyncplayTCPServerProtocol` and
//! `server.py`'s `SyncplayProxyTCPFactory`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::Transport;

use super::bridge;
use super::{strip_terminator, ProxyConfig};

/// Accepts connections off `listener` forever, spawning one bridge task per
/// peer (spec §4.9: "opens one upstream TCP connection per inbound
/// client").
pub async fn serve(listener: TcpListener, cfg: Arc<ProxyConfig>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let cfg = cfg.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, peer_addr, cfg).await {
                        debug!(%peer_addr, %error, "proxy: connection closed");
                    }
                });
            }
            Err(error) => warn!(%error, "proxy: accept failed"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    cfg: Arc<ProxyConfig>,
) -> io::Result<()> {
    let _ = stream.set_nodelay(true);
    let peer_ip = peer_addr.ip().to_string();
    let mut reader = BufReader::new(Transport::Plain(stream));

    // Real clients send `TLS` (if at all) as their very first frame, before
    // anything else — so only the first line is inspected for it. Once
    // that's resolved one way or the other, every later line (including a
    // stray second `TLS` request) is handled uniformly inside the bridge,
    // which always answers it locally with `startTLS: false`.
    let mut line = String::new();
    let mut pending = Vec::new();
    let first_read = reader.read_line(&mut line).await?;
    if first_read == 0 {
        return Ok(());
    }
    let trimmed = strip_terminator(&line).to_string();
    if !trimmed.is_empty() {
        let (tls, rest) = bridge::split_tls(&trimmed);
        if let Some(tls_msg) = tls {
            reader = negotiate_tls(reader, &tls_msg, cfg.tls.as_deref()).await?;
            if let Some(rest) = rest {
                pending.push(Value::Object(rest));
            }
        } else if let Ok(value) = serde_json::from_str::<Value>(&trimmed) {
            pending.push(value);
        }
    }

    let (read_half, write_half) = tokio::io::split(reader);

    let (front_line_tx, front_line_rx) = mpsc::unbounded_channel::<String>();
    let read_task = tokio::spawn(read_lines(read_half, front_line_tx));

    let (to_front_tx, mut to_front_rx) = mpsc::unbounded_channel::<String>();
    let write_task = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(line) = to_front_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\r\n").await.is_err() {
                break;
            }
        }
    });

    bridge::run(
        peer_ip,
        pending,
        front_line_rx,
        to_front_tx,
        cfg.upstream_host.clone(),
        cfg.upstream_port,
    )
    .await;

    read_task.abort();
    write_task.abort();
    Ok(())
}

async fn read_lines<R: tokio::io::AsyncRead + Unpin>(
    read_half: R,
    out: mpsc::UnboundedSender<String>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = strip_terminator(&line);
                if trimmed.is_empty() {
                    continue;
                }
                if out.send(trimmed.to_string()).is_err() {
                    break;
                }
            }
        }
    }
}

/// Handles one `TLS` sub-message read before the bridge started: upgrades
/// the transport in place if this front-end carries its own certificate,
/// otherwise reports the upgrade unavailable. Never touches the upstream
/// connection — spec §4.9(b): "if the front-end has its own certificate,
/// handle the TLS upgrade locally without forwarding."
async fn negotiate_tls(
    mut reader: BufReader<Transport>,
    tls_msg: &Value,
    tls: Option<&crate::security::TlsContext>,
) -> io::Result<BufReader<Transport>> {
    let wants_upgrade = tls_msg.get("startTLS").and_then(Value::as_str) == Some("send");
    if !wants_upgrade {
        send_tls_reply(&mut reader, false).await?;
        return Ok(reader);
    }
    let Some(tls) = tls else {
        send_tls_reply(&mut reader, false).await?;
        return Ok(reader);
    };

    send_tls_reply(&mut reader, true).await?;
    let transport = reader.into_inner();
    let Transport::Plain(tcp) = transport else {
        return Ok(BufReader::new(transport));
    };
    let tls_stream = tls.acceptor().accept(tcp).await?;
    Ok(BufReader::new(Transport::Tls(Box::new(tls_stream))))
}

async fn send_tls_reply(reader: &mut BufReader<Transport>, accepted: bool) -> io::Result<()> {
    let line = serde_json::json!({"TLS": {"startTLS": accepted.to_string()}}).to_string();
    reader.write_all(line.as_bytes()).await?;
    reader.write_all(b"\r\n").await?;
    reader.flush().await
}
