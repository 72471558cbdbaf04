//! Per-connection session state machine (spec §4.2): `Unauthenticated →
//! Authenticated`, dispatching parsed commands against the room actor. The
//! in-band TLS upgrade itself lives in [`crate::connection`], which is the
//! only layer that actually owns the transport; a `TLS` frame reaching this
//! dispatcher (post-Hello, where it's no longer meaningful) is simply
//! ignored rather than treated as an error.

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use crate::protocol::{
    ClientCommand, ConnectionId, ErrorResponse, HelloRequest, HelloResponse, HelloRoomResponse,
    ServerFrame, SetSubCommand,
};
use crate::room::{Outbox, RoomManagerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unauthenticated,
    Authenticated,
}

/// What the connection task should do after a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Close,
}

pub struct Session {
    conn_id: ConnectionId,
    manager: RoomManagerHandle,
    outbox: Outbox,
    cancel: CancellationToken,
    peer_addr: SocketAddr,
    state: State,
}

impl Session {
    #[must_use]
    pub fn new(
        conn_id: ConnectionId,
        manager: RoomManagerHandle,
        outbox: Outbox,
        cancel: CancellationToken,
        peer_addr: SocketAddr,
    ) -> Self {
        Self { conn_id, manager, outbox, cancel, peer_addr, state: State::Unauthenticated }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == State::Authenticated
    }

    pub fn notify_error(&self, message: &str) {
        self.send_error(message);
    }

    /// Dispatches one decoded command. Unauthenticated connections only
    /// accept `Hello` (spec §4.2); everything else before a successful
    /// Hello closes the connection with an Error frame already queued.
    pub async fn dispatch(&mut self, command: ClientCommand) -> Outcome {
        match command {
            ClientCommand::Tls(_) => Outcome::Continue,
            ClientCommand::Hello(request) if !self.is_authenticated() => {
                self.handle_hello(request).await
            }
            ClientCommand::Hello(_) => {
                self.send_error("already authenticated");
                Outcome::Close
            }
            other if !self.is_authenticated() => {
                drop(other);
                self.send_error("expected Hello before any other command");
                Outcome::Close
            }
            ClientCommand::Set(subs) => {
                for sub in subs {
                    self.handle_set(sub);
                }
                Outcome::Continue
            }
            ClientCommand::List => {
                self.manager.list(self.conn_id);
                Outcome::Continue
            }
            ClientCommand::State(request) => {
                self.manager.state(self.conn_id, request);
                Outcome::Continue
            }
            ClientCommand::Chat(message) => {
                self.manager.chat(self.conn_id, message);
                Outcome::Continue
            }
            ClientCommand::Error(_) => Outcome::Continue,
        }
    }

    async fn handle_hello(&mut self, request: HelloRequest) -> Outcome {
        let user_ip = Some(self.peer_addr.ip().to_string());
        match self
            .manager
            .hello(self.conn_id, request, user_ip, self.outbox.clone(), self.cancel.clone())
            .await
        {
            Ok(outcome) => {
                self.state = State::Authenticated;
                let frame = ServerFrame::Hello(HelloResponse {
                    username: outcome.username,
                    room: HelloRoomResponse { name: outcome.room_name },
                    version: outcome.version,
                    realversion: outcome.realversion,
                    motd: outcome.motd,
                    features: outcome.features,
                });
                let _ = self.outbox.send(frame);
                Outcome::Continue
            }
            Err(reason) => {
                self.send_error(&reason);
                Outcome::Close
            }
        }
    }

    fn handle_set(&self, sub: SetSubCommand) {
        match sub {
            SetSubCommand::Room(request) => self.manager.set_room(self.conn_id, request.name),
            SetSubCommand::File(file) => self.manager.set_file(self.conn_id, file),
            SetSubCommand::ControllerAuth(request) => {
                self.manager.controller_auth(self.conn_id, request.password, request.room);
            }
            SetSubCommand::Ready(request) => {
                self.manager.ready(self.conn_id, request.is_ready, request.manually_initiated);
            }
            SetSubCommand::PlaylistChange(request) => {
                self.manager.playlist_change(self.conn_id, request.files);
            }
            SetSubCommand::PlaylistIndex(request) => {
                self.manager.playlist_index(self.conn_id, request.index);
            }
            SetSubCommand::Features(features) => self.manager.features(self.conn_id, features),
        }
    }

    fn send_error(&self, message: &str) {
        let _ = self.outbox.send(ServerFrame::Error(ErrorResponse { message: message.to_string() }));
    }
}
