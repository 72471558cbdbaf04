//! `RoomManager` (spec §2, §5): the single Tokio task that owns the entire
//! room index and every watcher in it. Connection tasks never touch a
//! `Room` directly — they send a [`Command`] through a [`RoomManagerHandle`]
//! and the actor mutates state and fans out replies/broadcasts itself,
//! which is how the crate gets the spec's "no locks needed" guarantee
//! without reaching for the teacher's `DashMap`-sharded registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults::default_protocol_timeout_secs;
use crate::config::ServerConfig;
use crate::protocol::{
    meets_min_version, truncate_chars, ChatResponse, ClientFeatures, ConnectionId, FileInfo,
    HelloRequest, ListResponse, ListUserEntry, RoomSnapshot, ServerFeatureSet, ServerFrame,
    SetControllerAuthResponse, SetFileResponse, SetNewControlledRoomResponse,
    SetPlaylistChangeResponse, SetPlaylistIndexResponse, SetReadyResponse, SetResponse,
    SetRoomResponse, SetUserEvent, SetUserResponse, StateRequest, MIN_VERSION_CHAT,
};
use crate::security;
use crate::server::{feature, motd};

use super::room::Room;
use super::watcher::{Outbox, Watcher};

/// `PROTOCOL_TIMEOUT` (spec §4.4): a watcher with no State update in this
/// long is dropped by the manager's 1 Hz tick.
pub const PROTOCOL_TIMEOUT_SECS: f64 = default_protocol_timeout_secs();

/// The result of a successful Hello, handed back to the connection task so
/// it can build and send the Hello reply frame itself.
#[derive(Debug, Clone)]
pub struct HelloOutcome {
    pub username: String,
    pub room_name: String,
    pub version: String,
    pub realversion: &'static str,
    pub motd: String,
    pub features: ServerFeatureSet,
}

/// One request to the room actor. `Hello` and `ExportRooms` carry a reply
/// channel because their caller needs a value back; everything else is
/// fire-and-forget, since the actor already holds every watcher's outbox
/// and sends replies/broadcasts directly.
pub enum Command {
    Hello {
        conn_id: ConnectionId,
        request: HelloRequest,
        user_ip: Option<String>,
        outbox: Outbox,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<HelloOutcome, String>>,
    },
    SetRoom {
        conn_id: ConnectionId,
        name: String,
    },
    SetFile {
        conn_id: ConnectionId,
        file: FileInfo,
    },
    ControllerAuth {
        conn_id: ConnectionId,
        password: String,
        room: String,
    },
    Ready {
        conn_id: ConnectionId,
        is_ready: bool,
        manually_initiated: bool,
    },
    PlaylistChange {
        conn_id: ConnectionId,
        files: Vec<String>,
    },
    PlaylistIndex {
        conn_id: ConnectionId,
        index: Option<usize>,
    },
    Features {
        conn_id: ConnectionId,
        features: ClientFeatures,
    },
    List {
        conn_id: ConnectionId,
    },
    State {
        conn_id: ConnectionId,
        request: StateRequest,
    },
    Chat {
        conn_id: ConnectionId,
        message: String,
    },
    Disconnect {
        conn_id: ConnectionId,
    },
    ExportRooms {
        reply: oneshot::Sender<Vec<RoomSnapshot>>,
    },
}

/// A cheap-to-clone handle to the room actor. Every connection task gets
/// one; the actor itself lives only inside [`RoomManager::run`].
#[derive(Clone)]
pub struct RoomManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RoomManagerHandle {
    pub async fn hello(
        &self,
        conn_id: ConnectionId,
        request: HelloRequest,
        user_ip: Option<String>,
        outbox: Outbox,
        cancel: CancellationToken,
    ) -> Result<HelloOutcome, String> {
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(Command::Hello { conn_id, request, user_ip, outbox, cancel, reply })
            .is_err()
        {
            return Err("room manager is no longer running".to_string());
        }
        response
            .await
            .unwrap_or_else(|_| Err("room manager dropped the reply".to_string()))
    }

    pub fn set_room(&self, conn_id: ConnectionId, name: String) {
        let _ = self.tx.send(Command::SetRoom { conn_id, name });
    }

    pub fn set_file(&self, conn_id: ConnectionId, file: FileInfo) {
        let _ = self.tx.send(Command::SetFile { conn_id, file });
    }

    pub fn controller_auth(&self, conn_id: ConnectionId, password: String, room: String) {
        let _ = self.tx.send(Command::ControllerAuth { conn_id, password, room });
    }

    pub fn ready(&self, conn_id: ConnectionId, is_ready: bool, manually_initiated: bool) {
        let _ = self.tx.send(Command::Ready { conn_id, is_ready, manually_initiated });
    }

    pub fn playlist_change(&self, conn_id: ConnectionId, files: Vec<String>) {
        let _ = self.tx.send(Command::PlaylistChange { conn_id, files });
    }

    pub fn playlist_index(&self, conn_id: ConnectionId, index: Option<usize>) {
        let _ = self.tx.send(Command::PlaylistIndex { conn_id, index });
    }

    pub fn features(&self, conn_id: ConnectionId, features: ClientFeatures) {
        let _ = self.tx.send(Command::Features { conn_id, features });
    }

    pub fn list(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(Command::List { conn_id });
    }

    pub fn state(&self, conn_id: ConnectionId, request: StateRequest) {
        let _ = self.tx.send(Command::State { conn_id, request });
    }

    pub fn chat(&self, conn_id: ConnectionId, message: String) {
        let _ = self.tx.send(Command::Chat { conn_id, message });
    }

    pub fn disconnect(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(Command::Disconnect { conn_id });
    }

    /// `exportRooms()` (spec §4.11): a read-only snapshot for the stats
    /// snapshotter and the admin endpoint.
    pub async fn export_rooms(&self) -> Vec<RoomSnapshot> {
        let (reply, response) = oneshot::channel();
        if self.tx.send(Command::ExportRooms { reply }).is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }
}

/// Owns `rooms`, the server-wide username index, and the conn-id → room-name
/// lookup a watcher's back-reference is modeled as (spec §9: "a lookup
/// relation, not ownership").
pub struct RoomManager {
    config: Arc<ServerConfig>,
    salt: String,
    motd_template: Option<String>,
    rooms: HashMap<String, Room>,
    location: HashMap<ConnectionId, String>,
    names: HashMap<String, ConnectionId>,
}

impl RoomManager {
    /// Spawns the actor task and returns a handle to it. The MOTD template
    /// file (if configured) is read once here, not per connection.
    pub fn spawn(config: Arc<ServerConfig>, salt: String) -> RoomManagerHandle {
        let motd_template = config.motd_file_path.as_deref().and_then(|path| {
            std::fs::read_to_string(path)
                .inspect_err(|e| warn!(path, error = %e, "failed to read motd file"))
                .ok()
        });

        let manager = Self {
            config,
            salt,
            motd_template,
            rooms: HashMap::new(),
            location: HashMap::new(),
            names: HashMap::new(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(manager.run(rx));
        RoomManagerHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs_f64(super::room::SERVER_STATE_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        let now = wall_clock_now();
        match command {
            Command::Hello { conn_id, request, user_ip, outbox, cancel, reply } => {
                let outcome = self.handle_hello(conn_id, request, user_ip, outbox, cancel, now);
                let _ = reply.send(outcome);
            }
            Command::SetRoom { conn_id, name } => self.handle_set_room(conn_id, name, now),
            Command::SetFile { conn_id, file } => self.handle_set_file(conn_id, file),
            Command::ControllerAuth { conn_id, password, room } => {
                self.handle_controller_auth(conn_id, password, room);
            }
            Command::Ready { conn_id, is_ready, manually_initiated } => {
                self.handle_ready(conn_id, is_ready, manually_initiated);
            }
            Command::PlaylistChange { conn_id, files } => {
                self.handle_playlist_change(conn_id, files);
            }
            Command::PlaylistIndex { conn_id, index } => {
                self.handle_playlist_index(conn_id, index);
            }
            Command::Features { conn_id, features } => self.handle_features(conn_id, features),
            Command::List { conn_id } => self.handle_list(conn_id),
            Command::State { conn_id, request } => self.handle_state(conn_id, request, now),
            Command::Chat { conn_id, message } => self.handle_chat(conn_id, message),
            Command::Disconnect { conn_id } => self.remove_watcher(conn_id),
            Command::ExportRooms { reply } => {
                let snapshot = self.rooms.values().map(Room::snapshot).collect();
                let _ = reply.send(snapshot);
            }
        }
    }

    /// The per-watcher state pump plus `PROTOCOL_TIMEOUT` enforcement,
    /// driven by the actor's 1 Hz ticker (spec §4.4, §5).
    fn tick(&mut self) {
        let now = wall_clock_now();
        for room in self.rooms.values_mut() {
            room.pump_state(now);
        }

        let timed_out: Vec<ConnectionId> = self
            .rooms
            .values()
            .flat_map(|room| room.watchers.values())
            .filter(|watcher| now - watcher.last_updated_on > PROTOCOL_TIMEOUT_SECS)
            .map(|watcher| watcher.id)
            .collect();

        for conn_id in timed_out {
            debug!(%conn_id, "protocol timeout; dropping connection");
            if let Some(watcher) = self.find_watcher(conn_id) {
                watcher.cancel.cancel();
            }
            self.remove_watcher(conn_id);
        }
    }

    fn find_watcher(&self, conn_id: ConnectionId) -> Option<&Watcher> {
        let room_name = self.location.get(&conn_id)?;
        self.rooms.get(room_name)?.watchers.get(&conn_id)
    }

    fn handle_hello(
        &mut self,
        conn_id: ConnectionId,
        request: HelloRequest,
        user_ip: Option<String>,
        outbox: Outbox,
        cancel: CancellationToken,
        now: f64,
    ) -> Result<HelloOutcome, String> {
        let username = request.username.trim();
        let room_name = request.room.name.trim();
        let Some(version) = request.effective_version() else {
            return Err("missing protocol version".to_string());
        };
        if username.is_empty() {
            return Err("username must not be empty".to_string());
        }
        if room_name.is_empty() {
            return Err("room name must not be empty".to_string());
        }
        if let Some(configured) = &self.config.password {
            let supplied = request.password.as_deref().unwrap_or_default();
            if !security::server_password_matches(configured, supplied) {
                return Err("incorrect password".to_string());
            }
        }

        let username = truncate_chars(username, self.config.max_username_length);
        let room_name = truncate_chars(room_name, self.config.max_room_name_length);

        let mut final_username = username;
        while self.names.contains_key(&final_username.to_lowercase()) {
            final_username.push('_');
        }

        let features = feature::build_feature_set(&self.config, version);
        let motd = motd::render(
            self.motd_template.as_deref(),
            self.config.warn_old_clients,
            &motd::MotdContext {
                version,
                user_ip: user_ip.as_deref().unwrap_or(""),
                username: &final_username,
                room: &room_name,
            },
        );

        let watcher = Watcher::new(
            conn_id,
            final_username.clone(),
            version.to_string(),
            request.features.unwrap_or_default(),
            outbox,
            cancel,
            now,
        );

        self.names.insert(final_username.to_lowercase(), conn_id);
        self.location.insert(conn_id, room_name.clone());
        let room = self
            .rooms
            .entry(room_name.clone())
            .or_insert_with(|| Room::new(room_name.clone(), now));
        room.insert_watcher(watcher);
        broadcast_user_event(room, &final_username, Some(true), None);

        info!(%conn_id, username = %final_username, room = %room_name, "watcher joined");

        Ok(HelloOutcome {
            username: final_username,
            room_name,
            version: version.to_string(),
            realversion: crate::SERVER_VERSION,
            motd,
            features,
        })
    }

    fn handle_set_room(&mut self, conn_id: ConnectionId, new_name: String, now: f64) {
        let Some(old_room_name) = self.location.get(&conn_id).cloned() else {
            return;
        };
        let new_room_name = truncate_chars(new_name.trim(), self.config.max_room_name_length);
        if new_room_name == old_room_name {
            return;
        }

        let Some(old_room) = self.rooms.get_mut(&old_room_name) else {
            return;
        };
        let Some(mut watcher) = old_room.remove_watcher(conn_id) else {
            return;
        };
        let username = watcher.name.clone();
        broadcast_user_event(old_room, &username, None, Some(true));
        if old_room.is_empty() {
            self.rooms.remove(&old_room_name);
        }

        watcher.last_updated_on = now;
        self.location.insert(conn_id, new_room_name.clone());
        let new_room = self
            .rooms
            .entry(new_room_name.clone())
            .or_insert_with(|| Room::new(new_room_name.clone(), now));
        new_room.insert_watcher(watcher);
        broadcast_user_event(new_room, &username, Some(true), None);
    }

    fn handle_set_file(&mut self, conn_id: ConnectionId, mut file: FileInfo) {
        file.name = truncate_chars(&file.name, self.config.max_filename_length);
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(watcher) = room.watchers.get_mut(&conn_id) else {
            return;
        };
        watcher.file = Some(file.clone());
        let username = watcher.name.clone();
        let frame = ServerFrame::Set(Box::new(SetResponse {
            file: Some(SetFileResponse { username, file }),
            ..Default::default()
        }));
        broadcast_to_room(room, &frame);
    }

    fn handle_controller_auth(&mut self, conn_id: ConnectionId, password: String, room_name: String) {
        let Some(caller_room_name) = self.location.get(&conn_id).cloned() else {
            return;
        };
        let Some(username) = self
            .rooms
            .get(&caller_room_name)
            .and_then(|room| room.watchers.get(&conn_id))
            .map(|watcher| watcher.name.clone())
        else {
            return;
        };

        match security::check_controller_password(&room_name, &password, &self.salt) {
            Ok(Some(new_room_name)) => {
                self.send_to(conn_id, ServerFrame::Set(Box::new(SetResponse {
                    new_controlled_room: Some(SetNewControlledRoomResponse {
                        password,
                        room_name: new_room_name,
                    }),
                    ..Default::default()
                })));
            }
            Ok(None) => {
                if let Some(room) = self.rooms.get_mut(&room_name) {
                    if let Some(controllers) = &mut room.controllers {
                        controllers.insert(conn_id);
                    }
                }
                info!(%conn_id, room = %room_name, "controller authenticated");
                self.broadcast_server_wide(ServerFrame::Set(Box::new(SetResponse {
                    controller_auth: Some(SetControllerAuthResponse {
                        username,
                        room: room_name,
                        success: true,
                        is_controller: Some(true),
                    }),
                    ..Default::default()
                })));
            }
            Err(_) => {
                self.send_to(conn_id, ServerFrame::Set(Box::new(SetResponse {
                    controller_auth: Some(SetControllerAuthResponse {
                        username,
                        room: room_name,
                        success: false,
                        is_controller: None,
                    }),
                    ..Default::default()
                })));
            }
        }
    }

    fn handle_ready(&mut self, conn_id: ConnectionId, is_ready: bool, manually_initiated: bool) {
        if self.config.disable_ready {
            return;
        }
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(watcher) = room.watchers.get_mut(&conn_id) else {
            return;
        };
        watcher.ready = crate::protocol::Readiness::from_bool(is_ready);
        let username = watcher.name.clone();
        let frame = ServerFrame::Set(Box::new(SetResponse {
            ready: Some(SetReadyResponse { username, is_ready, manually_initiated }),
            ..Default::default()
        }));
        broadcast_to_room(room, &frame);
    }

    fn handle_playlist_change(&mut self, conn_id: ConnectionId, files: Vec<String>) {
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(username) = room.watchers.get(&conn_id).map(|w| w.name.clone()) else {
            return;
        };

        if room.can_control(conn_id) && room.playlist_is_valid(&files) {
            room.playlist = files.clone();
            let frame = ServerFrame::Set(Box::new(SetResponse {
                playlist_change: Some(SetPlaylistChangeResponse { user: username, files }),
                ..Default::default()
            }));
            broadcast_to_room(room, &frame);
        } else {
            let echo = ServerFrame::Set(Box::new(SetResponse {
                playlist_change: Some(SetPlaylistChangeResponse {
                    user: username,
                    files: room.playlist.clone(),
                }),
                ..Default::default()
            }));
            if let Some(watcher) = room.watchers.get(&conn_id) {
                watcher.send(echo);
            }
        }
    }

    fn handle_playlist_index(&mut self, conn_id: ConnectionId, index: Option<usize>) {
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(username) = room.watchers.get(&conn_id).map(|w| w.name.clone()) else {
            return;
        };

        if room.can_control(conn_id) {
            room.playlist_index = index;
            let frame = ServerFrame::Set(Box::new(SetResponse {
                playlist_index: Some(SetPlaylistIndexResponse { user: username, index }),
                ..Default::default()
            }));
            broadcast_to_room(room, &frame);
        } else {
            let echo = ServerFrame::Set(Box::new(SetResponse {
                playlist_index: Some(SetPlaylistIndexResponse {
                    user: username,
                    index: room.playlist_index,
                }),
                ..Default::default()
            }));
            if let Some(watcher) = room.watchers.get(&conn_id) {
                watcher.send(echo);
            }
        }
    }

    fn handle_features(&mut self, conn_id: ConnectionId, features: ClientFeatures) {
        if let Some(room) = self.room_of_mut(conn_id) {
            if let Some(watcher) = room.watchers.get_mut(&conn_id) {
                watcher.features = features;
            }
        }
    }

    fn handle_list(&mut self, conn_id: ConnectionId) {
        let Some(caller_room_name) = self.location.get(&conn_id).cloned() else {
            return;
        };

        let mut entries: HashMap<String, Vec<ListUserEntry>> = HashMap::new();
        if self.config.isolate_rooms {
            if let Some(room) = self.rooms.get(&caller_room_name) {
                entries.insert(caller_room_name.clone(), list_entries(room));
            }
        } else {
            for (name, room) in &self.rooms {
                entries.insert(name.clone(), list_entries(room));
            }
        }

        self.send_to(conn_id, ServerFrame::List(ListResponse(entries)));
    }

    fn handle_state(&mut self, conn_id: ConnectionId, request: StateRequest, now: f64) {
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(watcher) = room.watchers.get_mut(&conn_id) else {
            return;
        };

        if let Some(acked) = request.ignoring_on_the_fly.server {
            if acked == watcher.server_ignoring_on_the_fly {
                watcher.server_ignoring_on_the_fly = 0;
            }
        }
        if let Some(client_count) = request.ignoring_on_the_fly.client {
            watcher.client_ignoring_on_the_fly = Some(client_count);
        }

        let rtt = now - request.ping.latency_calculation;
        watcher.ping.record_rtt(rtt, request.ping.client_rtt);
        watcher.ping.client_latency_calculation = request.ping.client_latency_calculation;
        watcher.ping.client_latency_arrival_time = Some(now);

        if watcher.server_ignoring_on_the_fly == 0 {
            if let Some(playstate) = request.playstate {
                let forward_delay = watcher.ping.forward_delay;
                room.update_state(
                    conn_id,
                    playstate.position,
                    playstate.paused,
                    playstate.do_seek,
                    forward_delay,
                    now,
                );
            }
        }
    }

    fn handle_chat(&mut self, conn_id: ConnectionId, message: String) {
        if self.config.disable_chat {
            return;
        }
        let Some(room) = self.room_of_mut(conn_id) else {
            return;
        };
        let Some(username) = room.watchers.get(&conn_id).map(|w| w.name.clone()) else {
            return;
        };
        let message = truncate_chars(&message, self.config.max_chat_message_length);
        let frame = ServerFrame::Chat(ChatResponse { username, message });
        for watcher in room.watchers.values() {
            if meets_min_version(&watcher.version, MIN_VERSION_CHAT) {
                watcher.send(frame.clone());
            }
        }
    }

    /// Connection loss (spec §5 "Cancellation"): removes the watcher from
    /// its room, deletes the room if it's now empty, and broadcasts `left`.
    fn remove_watcher(&mut self, conn_id: ConnectionId) {
        let Some(room_name) = self.location.remove(&conn_id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_name) else {
            return;
        };
        let Some(watcher) = room.remove_watcher(conn_id) else {
            return;
        };
        self.names.remove(&watcher.name.to_lowercase());
        broadcast_user_event(room, &watcher.name, None, Some(true));
        if room.is_empty() {
            self.rooms.remove(&room_name);
        }
        info!(%conn_id, "watcher disconnected");
    }

    fn room_of_mut(&mut self, conn_id: ConnectionId) -> Option<&mut Room> {
        let room_name = self.location.get(&conn_id)?;
        self.rooms.get_mut(room_name)
    }

    fn send_to(&self, conn_id: ConnectionId, frame: ServerFrame) {
        if let Some(room_name) = self.location.get(&conn_id) {
            if let Some(room) = self.rooms.get(room_name) {
                if let Some(watcher) = room.watchers.get(&conn_id) {
                    watcher.send(frame);
                }
            }
        }
    }

    fn broadcast_server_wide(&self, frame: ServerFrame) {
        for room in self.rooms.values() {
            broadcast_to_room(room, &frame);
        }
    }
}

fn broadcast_to_room(room: &Room, frame: &ServerFrame) {
    for watcher in room.watchers.values() {
        watcher.send(frame.clone());
    }
}

fn broadcast_user_event(room: &Room, username: &str, joined: Option<bool>, left: Option<bool>) {
    let frame = ServerFrame::Set(Box::new(SetResponse {
        user: Some(SetUserResponse {
            username: username.to_string(),
            room: SetRoomResponse { name: room.name.clone() },
            event: SetUserEvent { joined, left },
        }),
        ..Default::default()
    }));
    broadcast_to_room(room, &frame);
}

fn list_entries(room: &Room) -> Vec<ListUserEntry> {
    room.watchers
        .values()
        .map(|watcher| ListUserEntry {
            username: watcher.name.clone(),
            room: SetRoomResponse { name: room.name.clone() },
            file: watcher.file.clone(),
            is_controller: room.can_control(watcher.id),
            is_ready: watcher.ready.as_bool(),
        })
        .collect()
}

fn wall_clock_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HelloRoomRequest;
    use tokio::sync::mpsc as tmpsc;

    fn config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig::default())
    }

    fn hello_request(username: &str, room: &str) -> HelloRequest {
        HelloRequest {
            username: username.to_string(),
            password: None,
            room: HelloRoomRequest { name: room.to_string() },
            version: Some("1.6.5".to_string()),
            realversion: None,
            features: None,
            user_ip: None,
        }
    }

    #[tokio::test]
    async fn second_join_with_same_name_gets_underscored_variant() {
        let handle = RoomManager::spawn(config(), "ABCDEFGHIJ".to_string());
        let (tx1, _rx1) = tmpsc::unbounded_channel();
        let (tx2, _rx2) = tmpsc::unbounded_channel();

        let first = handle
            .hello(
                ConnectionId::next(),
                hello_request("ann", "r1"),
                None,
                tx1,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(first.username, "ann");

        let second = handle
            .hello(
                ConnectionId::next(),
                hello_request("ann", "r1"),
                None,
                tx2,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(second.username, "ann_");
    }

    #[tokio::test]
    async fn empty_username_is_rejected() {
        let handle = RoomManager::spawn(config(), "ABCDEFGHIJ".to_string());
        let (tx, _rx) = tmpsc::unbounded_channel();
        let outcome = handle
            .hello(
                ConnectionId::next(),
                hello_request("  ", "r1"),
                None,
                tx,
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn export_rooms_reflects_joined_watcher() {
        let handle = RoomManager::spawn(config(), "ABCDEFGHIJ".to_string());
        let (tx, _rx) = tmpsc::unbounded_channel();
        handle
            .hello(ConnectionId::next(), hello_request("ann", "r1"), None, tx, CancellationToken::new())
            .await
            .unwrap();

        let snapshot = handle.export_rooms().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "r1");
        assert_eq!(snapshot[0].watcher_count, 1);
    }

    #[tokio::test]
    async fn disconnect_removes_empty_room() {
        let handle = RoomManager::spawn(config(), "ABCDEFGHIJ".to_string());
        let (tx, _rx) = tmpsc::unbounded_channel();
        let conn_id = ConnectionId::next();
        handle
            .hello(conn_id, hello_request("ann", "r1"), None, tx, CancellationToken::new())
            .await
            .unwrap();

        handle.disconnect(conn_id);
        // Give the actor a turn to process the fire-and-forget command.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = handle.export_rooms().await;
        assert!(snapshot.is_empty());
    }
}
