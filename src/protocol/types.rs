//! Core data-model types shared across the room engine and the wire
//! protocol: connection identifiers, watcher state, feature negotiation,
//! and the per-connection ping bookkeeping (spec §3).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one connected socket for the lifetime of that socket.
/// Generated by a process-wide monotonic counter the way the teacher keys
/// its connection registry by `PlayerId`, but without the UUID overhead —
/// nothing outside this process ever observes the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tri-state readiness: the original protocol distinguishes "hasn't told us
/// yet" from "told us they're not ready".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Readiness {
    #[default]
    Unknown,
    Ready,
    NotReady,
}

impl Readiness {
    #[must_use]
    pub const fn from_bool(is_ready: bool) -> Self {
        if is_ready {
            Self::Ready
        } else {
            Self::NotReady
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Ready => Some(true),
            Self::NotReady => Some(false),
        }
    }
}

/// A watcher's currently open file. `name` is truncated to
/// [`crate::config::ServerConfig::max_filename_length`] on receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub duration: f64,
}

/// Capability bag advertised by a client in its Hello and updated by
/// `Set.features` thereafter (spec §3 `FeatureSet`, client half).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFeatures {
    #[serde(default)]
    pub shared_playlists: bool,
    #[serde(default)]
    pub chat: bool,
    #[serde(default)]
    pub feature_list: bool,
    #[serde(default)]
    pub readiness: bool,
    #[serde(default)]
    pub managed_rooms: bool,
    #[serde(default)]
    pub persistent_rooms: bool,
}

/// The feature set the server advertises back to a client on Hello (spec §3
/// `FeatureSet`, server half). Gates which messages the server will bother
/// to process/forward for that client, based on
/// [`meets_min_version`](super::validation::meets_min_version).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFeatureSet {
    pub shared_playlists: bool,
    pub chat: bool,
    pub feature_list: bool,
    pub readiness: bool,
    pub managed_rooms: bool,
    pub max_chat_message_length: usize,
    pub max_username_length: usize,
    pub max_room_name_length: usize,
    pub max_filename_length: usize,
    pub isolate_rooms: bool,
}

/// Per-connection RTT moving average and forward-delay estimate (spec
/// §3 `PingState`, §4.4).
#[derive(Debug, Clone, Default)]
pub struct PingState {
    pub rtt: f64,
    pub avg_rtt: f64,
    pub forward_delay: f64,
    /// The `latencyCalculation` timestamp the client echoed back to us on
    /// its last State, stashed so the *next* outbound State can echo it
    /// back with server processing time added (spec §4.4 step 4).
    pub client_latency_calculation: Option<f64>,
    /// Wall-clock seconds at which `client_latency_calculation` arrived, so
    /// the processing delay can be measured in the same time base as
    /// `record_rtt`'s `now`.
    pub client_latency_arrival_time: Option<f64>,
}

impl PingState {
    pub const MOVING_AVERAGE_WEIGHT: f64 = 0.85;

    /// Folds a freshly observed RTT into the moving average and recomputes
    /// the forward delay, adjusting for reported client/server asymmetry
    /// (spec §4.4 step 3).
    pub fn record_rtt(&mut self, rtt: f64, client_reported_rtt: Option<f64>) {
        self.rtt = rtt;
        self.avg_rtt = Self::MOVING_AVERAGE_WEIGHT * self.avg_rtt
            + (1.0 - Self::MOVING_AVERAGE_WEIGHT) * rtt;
        let mut forward_delay = self.avg_rtt / 2.0;
        if let Some(client_rtt) = client_reported_rtt {
            if client_rtt < rtt {
                forward_delay += rtt - client_rtt;
            }
        }
        self.forward_delay = forward_delay;
    }
}

/// A read-only snapshot of one room for the external stats snapshotter and
/// the `exportRooms()` interface (spec §4.11, SPEC_FULL supplement).
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub name: String,
    pub watcher_count: usize,
    pub paused: bool,
    pub position: f64,
    pub playlist_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_distinct_and_monotonic() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn ping_state_moving_average() {
        let mut ping = PingState::default();
        ping.record_rtt(1.0, None);
        assert!((ping.avg_rtt - 0.15).abs() < 1e-9);
        ping.record_rtt(1.0, None);
        // avg = 0.85*0.15 + 0.15*1.0 = 0.2775
        assert!((ping.avg_rtt - 0.2775).abs() < 1e-9);
    }

    #[test]
    fn forward_delay_adjusts_for_asymmetry() {
        let mut ping = PingState::default();
        ping.avg_rtt = 2.0;
        ping.record_rtt(1.0, Some(0.2));
        // fd = avg'/2 + (rtt - client_rtt); avg' = 0.85*2.0 + 0.15*1.0 = 1.85
        let expected_fd = 1.85 / 2.0 + (1.0 - 0.2);
        assert!((ping.forward_delay - expected_fd).abs() < 1e-9);
    }

    #[test]
    fn readiness_round_trips_through_bool() {
        assert_eq!(Readiness::from_bool(true).as_bool(), Some(true));
        assert_eq!(Readiness::from_bool(false).as_bool(), Some(false));
        assert_eq!(Readiness::Unknown.as_bool(), None);
    }
}
