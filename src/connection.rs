//! Transport, line framing, and the accept loop (spec §4.1, §4.9 in-band
//! TLS upgrade). This is the only layer that owns a live socket; everything
//! above it (the [`crate::server::Session`] state machine, the
//! [`crate::room`] actor) only ever sees decoded commands and frames.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{self, ClientCommand, ConnectionId, ErrorResponse, ServerFrame, TlsResponse};
use crate::room::RoomManagerHandle;
use crate::security::TlsContext;
use crate::server::{Outcome, Session};

/// A plain or TLS-upgraded duplex stream. Both variants are `Unpin`, so the
/// `AsyncRead`/`AsyncWrite` impls below can safely call `Pin::get_mut`
/// instead of reaching for `pin-project`.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Binds a listener on every address family available to the host. Spec
/// §6: a nonzero exit is warranted only once neither family bound.
pub async fn bind_dual_stack(port: u16) -> io::Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listeners.push(listener),
        Err(error) => warn!(%error, "failed to bind IPv4"),
    }
    match TcpListener::bind(("::", port)).await {
        Ok(listener) => listeners.push(listener),
        Err(error) => warn!(%error, "failed to bind IPv6"),
    }
    if listeners.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "failed to bind to either IPv4 or IPv6",
        ));
    }
    Ok(listeners)
}

/// Accepts connections off `listener` forever, spawning one task per peer.
pub async fn serve(listener: TcpListener, manager: RoomManagerHandle, tls: Option<Arc<TlsContext>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let manager = manager.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, peer_addr, manager, tls).await {
                        debug!(%peer_addr, %error, "connection closed");
                    }
                });
            }
            Err(error) => warn!(%error, "accept failed"),
        }
    }
}

/// Drains whatever the session has queued onto `outbox_rx` since the last
/// drain, writing each frame straight to `writer`. Used only during the
/// pre-authentication phase, where nothing else is reading from the
/// channel yet.
async fn drain_outbox<W: AsyncWrite + Unpin>(
    writer: &mut W,
    outbox_rx: &mut mpsc::UnboundedReceiver<ServerFrame>,
) -> io::Result<()> {
    while let Ok(frame) = outbox_rx.try_recv() {
        write_frame(writer, &frame).await?;
    }
    Ok(())
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &ServerFrame) -> io::Result<()> {
    let line = frame
        .encode()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Drives one connection end to end: the pre-auth phase (Hello, optional
/// in-band TLS upgrade) on a single shared transport, then — once
/// authenticated — a split read/write pair so the room actor's broadcasts
/// can reach the socket concurrently with the client's own lines.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    manager: RoomManagerHandle,
    tls: Option<Arc<TlsContext>>,
) -> io::Result<()> {
    let _ = stream.set_nodelay(true);

    let conn_id = ConnectionId::next();
    let cancel = CancellationToken::new();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut session = Session::new(conn_id, manager.clone(), outbox_tx, cancel.clone(), peer_addr);

    let mut reader = BufReader::new(Transport::Plain(stream));
    let mut line = String::new();

    // Phase 1: pre-authentication. No watcher exists yet, so nothing can
    // race a write onto this transport besides our own direct replies.
    loop {
        line.clear();
        let read = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = reader.read_line(&mut line) => result?,
        };
        if read == 0 {
            return Ok(());
        }
        let trimmed = strip_terminator(&line);
        if trimmed.is_empty() {
            continue;
        }

        let commands = match protocol::parse_frame(trimmed) {
            Ok(commands) => commands,
            Err(error) => {
                let frame = ServerFrame::Error(ErrorResponse { message: error.to_string() });
                write_frame(&mut reader, &frame).await?;
                return Ok(());
            }
        };

        for command in commands {
            if let ClientCommand::Tls(request) = command {
                reader = handle_tls_request(reader, &request.start_tls, tls.as_deref()).await?;
                continue;
            }
            let outcome = session.dispatch(command).await;
            drain_outbox(&mut reader, &mut outbox_rx).await?;
            if outcome == Outcome::Close {
                return Ok(());
            }
        }

        if session.is_authenticated() {
            break;
        }
    }

    // Phase 2: authenticated. Split so the writer task can forward
    // broadcasts from the room actor independently of the read loop.
    let (read_half, mut write_half) = tokio::io::split(reader);
    let mut reader = BufReader::new(read_half);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    let result = async {
        loop {
            line.clear();
            let read = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = reader.read_line(&mut line) => result?,
            };
            if read == 0 {
                return Ok(());
            }
            let trimmed = strip_terminator(&line);
            if trimmed.is_empty() {
                continue;
            }

            let commands = match protocol::parse_frame(trimmed) {
                Ok(commands) => commands,
                Err(_) => {
                    session.notify_error("malformed frame");
                    return Ok(());
                }
            };
            for command in commands {
                if session.dispatch(command).await == Outcome::Close {
                    return Ok(());
                }
            }
        }
    }
    .await;

    manager.disconnect(conn_id);
    writer_task.abort();
    info!(%conn_id, %peer_addr, "connection closed");
    result
}

/// Handles one `TLS` frame during the pre-auth phase: `"send"` negotiates
/// an upgrade (or reports it unavailable), anything else is refused.
/// Consumes and returns the reader so the underlying `Transport` can be
/// swapped out from under it.
async fn handle_tls_request(
    mut reader: BufReader<Transport>,
    start_tls: &str,
    tls: Option<&TlsContext>,
) -> io::Result<BufReader<Transport>> {
    if start_tls != "send" {
        let frame = ServerFrame::TLS(TlsResponse { start_tls: "false" });
        write_frame(&mut reader, &frame).await?;
        return Ok(reader);
    }
    let Some(tls) = tls else {
        let frame = ServerFrame::TLS(TlsResponse { start_tls: "false" });
        write_frame(&mut reader, &frame).await?;
        return Ok(reader);
    };

    let frame = ServerFrame::TLS(TlsResponse { start_tls: "true" });
    write_frame(&mut reader, &frame).await?;

    let transport = reader.into_inner();
    let Transport::Plain(tcp) = transport else {
        // Already upgraded; a second TLS request is nonsensical but not
        // fatal, just hand the stream back unchanged.
        return Ok(BufReader::new(transport));
    };
    let acceptor = tls.acceptor();
    let tls_stream = acceptor.accept(tcp).await?;
    Ok(BufReader::new(Transport::Tls(Box::new(tls_stream))))
}
