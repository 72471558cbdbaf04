//! The optional pass-through proxy variant (spec §4.9): a front-end that
//! accepts client connections over TCP or WebSocket and relays JSON frames
//! to a single upstream core server, without interpreting the protocol
//! beyond two narrow exceptions — tagging the first `Hello` with the
//! inbound peer's address, and answering `TLS` requests locally instead of
//! forwarding them upstream. This is an external collaborator to the core
//! (spec §1): it never touches a [`crate::room`] actor or [`crate::server`]
//! session, it only shuttles lines between two sockets.
//!
//! Grounded in `examples/original_source/syncplay/protocols.py`'s
//! `SyncplayTCPServerProtocol`/`SyncplayWSServerProtocol` (per-connection
//! buffering until the upstream client connects, `user_ip` injection,
//! locally-answered `TLS` frames) and `server.py`'s
//! `SyncplayProxyTCPFactory`/`SyncplayProxyWSFactory` (one upstream
//! `host:port` per factory, optional local TLS certificate).

mod bridge;
pub mod tcp;
pub mod ws;

use std::sync::Arc;

use crate::security::TlsContext;

/// Where to reach the upstream core server this proxy forwards to, and
/// (TCP front-end only) the optional local certificate used to answer
/// in-band `TLS` upgrade requests without involving the upstream at all.
#[derive(Clone)]
pub struct ProxyConfig {
    pub upstream_host: String,
    pub upstream_port: u16,
    pub tls: Option<Arc<TlsContext>>,
}

impl ProxyConfig {
    #[must_use]
    pub fn new(upstream_host: impl Into<String>, upstream_port: u16) -> Self {
        Self {
            upstream_host: upstream_host.into(),
            upstream_port,
            tls: None,
        }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: Arc<TlsContext>) -> Self {
        self.tls = Some(tls);
        self
    }
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}
