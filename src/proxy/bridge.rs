//! Transport-agnostic half of the proxy: once a front-end (TCP or
//! WebSocket) has decoded its peer into a stream of raw lines, this module
//! owns the upstream `TcpStream`, the `user_ip` injection, and the
//! buffering of frames sent before that upstream connection completes
//! (spec §4.9: "Buffer frames received before the upstream connection is
//! established").

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;

use super::strip_terminator;

/// Runs the bridge for one front-end connection to completion: connects
/// upstream, replays `pending` (frames read from the front-end before this
/// call started), then pumps `from_front` to the upstream socket and the
/// upstream socket's replies to `to_front` until either side closes.
///
/// `peer_ip` is stamped onto the first (and only the first) `Hello` frame
/// as `user_ip`, matching `protocols.py`'s
/// `messages["Hello"]["user_ip"] = self.transport.getPeer().host` — every
/// frame is inspected only for a top-level `Hello` key, nothing deeper.
pub async fn run(
    peer_ip: String,
    pending: Vec<Value>,
    mut from_front: mpsc::UnboundedReceiver<String>,
    to_front: mpsc::UnboundedSender<String>,
    upstream_host: String,
    upstream_port: u16,
) {
    let (to_upstream_tx, to_upstream_rx) = mpsc::unbounded_channel::<String>();

    for message in pending {
        if let Some(line) = inject_user_ip(message, &peer_ip) {
            let _ = to_upstream_tx.send(line);
        }
    }

    let upstream_task = tokio::spawn(pump_upstream(
        upstream_host,
        upstream_port,
        to_upstream_rx,
        to_front.clone(),
    ));

    while let Some(line) = from_front.recv().await {
        let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        // `TLS` is always answered locally (front-end's own concern) and
        // never forwarded upstream, mirroring both proxy protocols' own
        // `handleTLS` — the front-end either performs its own upgrade
        // (TCP, see `tcp.rs`) before frames reach the bridge, or (WS)
        // simply refuses it here.
        if map.remove("TLS").is_some() {
            let reply = serde_json::json!({"TLS": {"startTLS": "false"}}).to_string();
            let _ = to_front.send(reply);
        }
        if let Some(line) = inject_user_ip(Value::Object(map), &peer_ip) {
            let _ = to_upstream_tx.send(line);
        }
    }

    drop(to_upstream_tx);
    let _ = upstream_task.await;
}

fn inject_user_ip(value: Value, peer_ip: &str) -> Option<String> {
    let Value::Object(mut map) = value else {
        return None;
    };
    if let Some(Value::Object(hello)) = map.get_mut("Hello") {
        hello.insert("user_ip".to_string(), Value::String(peer_ip.to_string()));
    }
    if map.is_empty() {
        return None;
    }
    serde_json::to_string(&Value::Object(map)).ok()
}

/// Opens one upstream connection per inbound client (spec §4.9) and pumps
/// frames in both directions until either side closes. A failed connect
/// just drops the bridge — the front-end task notices when `to_front`'s
/// sender is dropped and closes its own side.
async fn pump_upstream(
    host: String,
    port: u16,
    mut to_upstream_rx: mpsc::UnboundedReceiver<String>,
    to_front: mpsc::UnboundedSender<String>,
) {
    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, host, port, "proxy: failed to connect upstream");
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let reader_task = tokio::spawn(async move {
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
                    if to_front.send(trimmed.to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(line) = to_upstream_rx.recv().await {
        if write_half.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if write_half.write_all(b"\r\n").await.is_err() {
            break;
        }
    }
    reader_task.abort();
}

/// Parses one already-trimmed line as a JSON object, extracting a `TLS`
/// sub-message if present. Used by front-ends to decide, before the bridge
/// ever sees the line, whether a locally-terminated TLS upgrade applies.
pub fn split_tls(line: &str) -> (Option<Value>, Option<Map<String, Value>>) {
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(line) else {
        return (None, None);
    };
    let tls = map.remove("TLS");
    if map.is_empty() {
        (tls, None)
    } else {
        (tls, Some(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_user_ip_stamps_hello_only() {
        let value = serde_json::json!({"Hello": {"username": "ann"}});
        let line = inject_user_ip(value, "203.0.113.7").unwrap();
        let decoded: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded["Hello"]["user_ip"], "203.0.113.7");
        assert_eq!(decoded["Hello"]["username"], "ann");
    }

    #[test]
    fn inject_user_ip_leaves_other_tags_untouched() {
        let value = serde_json::json!({"Chat": "hi"});
        let line = inject_user_ip(value, "203.0.113.7").unwrap();
        let decoded: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded["Chat"], "hi");
        assert!(decoded.get("user_ip").is_none());
    }

    #[test]
    fn inject_user_ip_drops_empty_object() {
        let value = serde_json::json!({});
        assert!(inject_user_ip(value, "203.0.113.7").is_none());
    }

    #[test]
    fn split_tls_extracts_tls_and_keeps_rest() {
        let (tls, rest) = split_tls(r#"{"TLS":{"startTLS":"send"},"Hello":{"username":"ann"}}"#);
        assert_eq!(tls.unwrap()["startTLS"], "send");
        assert!(rest.unwrap().contains_key("Hello"));
    }

    #[test]
    fn split_tls_returns_no_rest_when_tls_only() {
        let (tls, rest) = split_tls(r#"{"TLS":{"startTLS":"send"}}"#);
        assert!(tls.is_some());
        assert!(rest.is_none());
    }

    #[test]
    fn split_tls_returns_none_for_non_tls_line() {
        let (tls, rest) = split_tls(r#"{"Chat":"hi"}"#);
        assert!(tls.is_none());
        assert!(rest.unwrap().contains_key("Chat"));
    }
}
