//! Room membership, the authoritative playback cursor, and playlist state
//! (spec §3 Room/ControlledRoom, §4.4 position reconciliation, §4.5 State
//! encoding).

use std::collections::{HashMap, HashSet};

use crate::config::defaults::{default_playlist_max_characters, default_playlist_max_items};
use crate::protocol::{
    ConnectionId, IgnoringOnTheFlyResponse, RoomSnapshot, ServerFrame, StatePingResponse,
    StatePlaystateResponse, StateResponse,
};
use crate::security;

use super::watcher::{elect_reference, Watcher};

/// `SERVER_STATE_INTERVAL`: cadence of the per-watcher state pump.
pub const SERVER_STATE_INTERVAL_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Paused,
    Playing,
}

/// A named synchronization group. Plain rooms accept mutation from any
/// member; a `ControlledRoom` (the `+base:hash` shape, spec §4.6) accepts it
/// only from watchers in `controllers`.
pub struct Room {
    pub name: String,
    pub watchers: HashMap<ConnectionId, Watcher>,
    pub play_state: PlayState,
    pub set_by: Option<ConnectionId>,
    pub playlist: Vec<String>,
    pub playlist_index: Option<usize>,
    pub position: f64,
    pub last_update: f64,
    /// `Some` (even if empty) exactly when this room's name is
    /// controlled-shaped.
    pub controllers: Option<HashSet<ConnectionId>>,
}

impl Room {
    #[must_use]
    pub fn new(name: String, now: f64) -> Self {
        let controllers = security::is_controlled_room_name(&name).map(|_| HashSet::new());
        Self {
            name,
            watchers: HashMap::new(),
            play_state: PlayState::Paused,
            set_by: None,
            playlist: Vec::new(),
            playlist_index: None,
            position: 0.0,
            last_update: now,
            controllers,
        }
    }

    #[must_use]
    pub fn is_controlled(&self) -> bool {
        self.controllers.is_some()
    }

    #[must_use]
    pub fn can_control(&self, id: ConnectionId) -> bool {
        match &self.controllers {
            Some(controllers) => controllers.contains(&id),
            None => true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn insert_watcher(&mut self, watcher: Watcher) {
        self.watchers.insert(watcher.id, watcher);
    }

    pub fn remove_watcher(&mut self, id: ConnectionId) -> Option<Watcher> {
        if let Some(controllers) = &mut self.controllers {
            controllers.remove(&id);
        }
        self.watchers.remove(&id)
    }

    fn reference_pool(&self) -> Box<dyn Iterator<Item = &Watcher> + '_> {
        match &self.controllers {
            Some(controllers) => {
                Box::new(self.watchers.values().filter(move |w| controllers.contains(&w.id)))
            }
            None => Box::new(self.watchers.values()),
        }
    }

    /// `Room.getPosition()` (spec §4.4 steps 1-3): lazily re-elects the
    /// reference watcher once a second has elapsed since the last
    /// reconciliation, otherwise extrapolates by wall-clock while playing.
    pub fn get_position(&mut self, now: f64) -> f64 {
        let age = now - self.last_update;
        if age > 1.0 {
            if let Some(reference) = elect_reference(self.reference_pool()) {
                if let Some(position) = self.watchers.get(&reference).and_then(|w| w.position) {
                    self.position = position;
                    self.set_by = Some(reference);
                    self.last_update = now;
                }
            }
        }
        if self.play_state == PlayState::Playing {
            self.position + (now - self.last_update)
        } else {
            self.position
        }
    }

    #[must_use]
    pub fn playlist_is_valid(&self, files: &[String]) -> bool {
        crate::protocol::playlist_is_valid(
            files,
            default_playlist_max_items(),
            default_playlist_max_characters(),
        )
    }

    /// `forcePositionUpdate` (spec §4.4): adopts `origin`'s reported position
    /// as authoritative, stamps `setBy`, and broadcasts a forced State to
    /// every room member, bumping each recipient's
    /// `server_ignoring_on_the_fly` so the server ignores their next State
    /// frames until acknowledged.
    pub fn force_position_update(&mut self, origin: ConnectionId, do_seek: bool, paused: bool, now: f64) {
        let origin_position = self.watchers.get(&origin).and_then(|w| w.position);
        if let Some(position) = origin_position {
            self.position = position;
        }
        self.set_by = Some(origin);
        self.last_update = now;
        self.play_state = if paused {
            PlayState::Paused
        } else {
            PlayState::Playing
        };

        let set_by_name = self.watchers.get(&origin).map(|w| w.name.clone());
        let position = self.position;
        for watcher in self.watchers.values_mut() {
            watcher.server_ignoring_on_the_fly += 1;
            let frame = state_frame_for(watcher, position, paused, do_seek, set_by_name.clone(), now);
            watcher.send(frame);
        }
    }

    /// Re-sends the authoritative room state to a single watcher who
    /// attempted (and was denied) a mutation of a controlled room (spec
    /// §4.4 "non-controller rejection": two States with `doSeek=true`, the
    /// first echoing the offender's own paused state for very old clients).
    pub fn resync_offender(&mut self, offender: ConnectionId, now: f64) {
        let offender_paused = matches!(self.play_state, PlayState::Paused);
        let set_by_name = self.set_by.and_then(|id| self.watchers.get(&id)).map(|w| w.name.clone());
        let position = self.get_position(now);
        let Some(watcher) = self.watchers.get_mut(&offender) else {
            return;
        };
        let echo = state_frame_for(watcher, position, offender_paused, true, set_by_name.clone(), now);
        watcher.send(echo);
        let authoritative = state_frame_for(
            watcher,
            position,
            matches!(self.play_state, PlayState::Paused),
            true,
            set_by_name,
            now,
        );
        watcher.send(authoritative);
    }

    /// `Watcher.updateState` (spec §4.4): folds an inbound playstate report
    /// into the watcher and, on a pause flip or an explicit seek, routes
    /// through `forcePositionUpdate`/`resync_offender` depending on whether
    /// `watcher_id` is allowed to control this room.
    pub fn update_state(
        &mut self,
        watcher_id: ConnectionId,
        position: f64,
        paused: bool,
        do_seek: bool,
        forward_delay: f64,
        now: f64,
    ) {
        let flipped = paused != matches!(self.play_state, PlayState::Paused);
        let adjusted_position = if paused { position } else { position + forward_delay };
        if let Some(watcher) = self.watchers.get_mut(&watcher_id) {
            watcher.position = Some(adjusted_position);
            watcher.last_updated_on = now;
        }

        let can_control = self.can_control(watcher_id);

        if flipped && can_control {
            self.play_state = if paused { PlayState::Paused } else { PlayState::Playing };
            self.set_by = Some(watcher_id);
        }

        if do_seek || flipped {
            if can_control {
                self.force_position_update(watcher_id, do_seek, paused, now);
            } else {
                self.resync_offender(watcher_id, now);
            }
        }
    }

    /// Per-watcher state pump (spec §4.4, §4.5): non-forced, so suppressed
    /// for any watcher still waiting on a forced-update acknowledgement.
    pub fn pump_state(&mut self, now: f64) {
        let position = self.get_position(now);
        let paused = matches!(self.play_state, PlayState::Paused);
        let set_by_name = self.set_by.and_then(|id| self.watchers.get(&id)).map(|w| w.name.clone());
        for watcher in self.watchers.values_mut() {
            if watcher.server_ignoring_on_the_fly > 0 {
                continue;
            }
            let frame = state_frame_for(watcher, position, paused, false, set_by_name.clone(), now);
            watcher.send(frame);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            name: self.name.clone(),
            watcher_count: self.watchers.len(),
            paused: matches!(self.play_state, PlayState::Paused),
            position: self.position,
            playlist_len: self.playlist.len(),
        }
    }
}

/// Builds the outbound State frame for `watcher`, consuming (and clearing)
/// its one-shot ping echo and client-side ignore counter (spec §4.5: "client
/// is cleared after emission").
pub fn state_frame_for(
    watcher: &mut Watcher,
    position: f64,
    paused: bool,
    do_seek: bool,
    set_by: Option<String>,
    now: f64,
) -> ServerFrame {
    let server_count = watcher.server_ignoring_on_the_fly;
    let client_count = watcher.client_ignoring_on_the_fly.take();
    let ignoring_on_the_fly = if server_count > 0 || client_count.is_some() {
        Some(IgnoringOnTheFlyResponse {
            server: (server_count > 0).then_some(server_count),
            client: client_count,
        })
    } else {
        None
    };

    let client_latency_calculation = watcher.ping.client_latency_calculation.take().map(|echoed| {
        let processing = watcher
            .ping
            .client_latency_arrival_time
            .take()
            .map(|arrival| now - arrival)
            .unwrap_or(0.0);
        echoed + processing
    });

    ServerFrame::State(Box::new(StateResponse {
        playstate: StatePlaystateResponse {
            position,
            paused,
            do_seek,
            set_by,
        },
        ping: StatePingResponse {
            latency_calculation: now,
            server_rtt: watcher.ping.avg_rtt,
            client_latency_calculation,
        },
        ignoring_on_the_fly,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientFeatures, FileInfo};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn watcher_with(name: &str, position: Option<f64>, has_file: bool) -> (Watcher, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut w = Watcher::new(
            ConnectionId::next(),
            name.to_string(),
            "1.6.5".to_string(),
            ClientFeatures::default(),
            tx,
            CancellationToken::new(),
            0.0,
        );
        w.position = position;
        if has_file {
            w.file = Some(FileInfo {
                name: "movie.mkv".to_string(),
                size: 1,
                duration: 1.0,
            });
        }
        (w, rx)
    }

    #[test]
    fn new_room_is_uncontrolled_by_default() {
        let room = Room::new("movienight".to_string(), 0.0);
        assert!(!room.is_controlled());
        assert!(room.can_control(ConnectionId::next()));
    }

    #[test]
    fn controlled_room_name_creates_empty_controller_set() {
        let room = Room::new("+movienight:0123456789ab".to_string(), 0.0);
        assert!(room.is_controlled());
        assert!(!room.can_control(ConnectionId::next()));
    }

    #[test]
    fn get_position_elects_smallest_position_after_one_second() {
        let mut room = Room::new("r1".to_string(), 0.0);
        let (a, _ra) = watcher_with("a", Some(50.0), true);
        let (b, _rb) = watcher_with("b", Some(10.0), true);
        let b_id = b.id;
        room.insert_watcher(a);
        room.insert_watcher(b);

        // within the first second, no election happens
        assert!((room.get_position(0.5) - 0.0).abs() < 1e-9);

        let position = room.get_position(1.5);
        assert!((position - 10.0).abs() < 1e-9);
        assert_eq!(room.set_by, Some(b_id));
    }

    #[test]
    fn playing_room_extrapolates_position_by_wall_clock() {
        let mut room = Room::new("r1".to_string(), 0.0);
        room.play_state = PlayState::Playing;
        room.position = 100.0;
        room.last_update = 0.0;
        // No watchers, so no re-election happens; position extrapolates.
        let position = room.get_position(5.0);
        assert!((position - 105.0).abs() < 1e-9);
    }

    #[test]
    fn force_position_update_broadcasts_to_every_member() {
        let mut room = Room::new("r1".to_string(), 0.0);
        let (a, mut ra) = watcher_with("a", Some(120.0), true);
        let (b, mut rb) = watcher_with("b", Some(0.0), true);
        let a_id = a.id;
        room.insert_watcher(a);
        room.insert_watcher(b);

        room.force_position_update(a_id, true, false, 1.0);

        assert!((room.position - 120.0).abs() < 1e-9);
        assert_eq!(room.set_by, Some(a_id));
        assert!(matches!(ra.try_recv(), Ok(ServerFrame::State(_))));
        assert!(matches!(rb.try_recv(), Ok(ServerFrame::State(_))));
        assert_eq!(room.watchers[&a_id].server_ignoring_on_the_fly, 1);
    }

    #[test]
    fn update_state_seek_by_controller_updates_room_position() {
        let mut room = Room::new("r1".to_string(), 0.0);
        let (a, mut ra) = watcher_with("a", Some(0.0), true);
        let a_id = a.id;
        room.insert_watcher(a);

        room.update_state(a_id, 120.0, false, true, 0.0, 1.0);

        assert!((room.position - 120.0).abs() < 1e-9);
        assert_eq!(room.set_by, Some(a_id));
        assert!(matches!(ra.try_recv(), Ok(ServerFrame::State(_))));
    }

    #[test]
    fn update_state_seek_by_non_controller_is_rejected_and_resynced() {
        let mut room = Room::new("+r2:0123456789ab".to_string(), 0.0);
        let (a, mut ra) = watcher_with("a", Some(0.0), true);
        let a_id = a.id;
        room.insert_watcher(a);
        room.position = 10.0;

        room.update_state(a_id, 999.0, false, true, 0.0, 1.0);

        assert!((room.position - 10.0).abs() < 1e-9);
        assert_ne!(room.set_by, Some(a_id));
        // two resync States, no forced-update counter bump
        assert!(matches!(ra.try_recv(), Ok(ServerFrame::State(_))));
        assert!(matches!(ra.try_recv(), Ok(ServerFrame::State(_))));
        assert_eq!(room.watchers[&a_id].server_ignoring_on_the_fly, 0);
    }
}
