//! Per-connection participant state (spec §3 Watcher) and the ordering rule
//! that elects a room's authoritative reference watcher (spec §4.4).

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ClientFeatures, ConnectionId, FileInfo, PingState, Readiness, ServerFrame};

/// Channel back into the connection's writer task. Sending never blocks the
/// actor — the queue is unbounded, matching spec §5's "no suspension inside
/// room broadcast".
pub type Outbox = mpsc::UnboundedSender<ServerFrame>;

/// An authenticated client connection participating in a room.
pub struct Watcher {
    pub id: ConnectionId,
    pub name: String,
    pub file: Option<FileInfo>,
    pub position: Option<f64>,
    pub last_updated_on: f64,
    pub ready: Readiness,
    pub version: String,
    pub features: ClientFeatures,
    pub ping: PingState,
    /// Incremented once per forced broadcast the watcher is sent; the
    /// server ignores inbound State frames until the client's echoed count
    /// matches (spec §4.4 step 1, §5 "monotonic per connection").
    pub server_ignoring_on_the_fly: u32,
    /// Set by the most recent inbound State's `ignoringOnTheFly.client`;
    /// echoed back once, then cleared (spec §4.5).
    pub client_ignoring_on_the_fly: Option<u32>,
    pub outbox: Outbox,
    /// Cancelled by the room actor to make the connection task tear down
    /// the socket (protocol timeout, kick, or server shutdown).
    pub cancel: CancellationToken,
}

impl Watcher {
    #[must_use]
    pub fn new(
        id: ConnectionId,
        name: String,
        version: String,
        features: ClientFeatures,
        outbox: Outbox,
        cancel: CancellationToken,
        now: f64,
    ) -> Self {
        Self {
            id,
            name,
            file: None,
            position: None,
            last_updated_on: now,
            ready: Readiness::Unknown,
            version,
            features,
            ping: PingState::default(),
            server_ignoring_on_the_fly: 0,
            client_ignoring_on_the_fly: None,
            outbox,
            cancel,
        }
    }

    pub fn send(&self, frame: ServerFrame) {
        // The receiver only disappears once the connection task has already
        // torn down; a dropped frame at that point is moot.
        let _ = self.outbox.send(frame);
    }

    /// Watchers missing a reported position or an open file are never
    /// elected the room's reference (spec §4.4).
    #[must_use]
    pub fn is_eligible_reference(&self) -> bool {
        self.file.is_some() && self.position.is_some()
    }
}

/// Elects the watcher with the smallest reported position among
/// `candidates`, per the `a < b` ordering in spec §4.4. Ineligible watchers
/// (no file, no position) never win.
#[must_use]
pub fn elect_reference<'a>(candidates: impl Iterator<Item = &'a Watcher>) -> Option<ConnectionId> {
    candidates
        .filter(|w| w.is_eligible_reference())
        .min_by(|a, b| {
            a.position
                .partial_cmp(&b.position)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|w| w.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(id: u64, position: Option<f64>, has_file: bool) -> Watcher {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut w = Watcher::new(
            crate::protocol::ConnectionId::next(),
            format!("w{id}"),
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
                size: 100,
                duration: 60.0,
            });
        }
        w
    }

    #[test]
    fn elects_smallest_position_among_eligible_watchers() {
        let a = watcher(1, Some(50.0), true);
        let b = watcher(2, Some(10.0), true);
        let c = watcher(3, Some(5.0), false); // no file: ineligible
        let elected = elect_reference([&a, &b, &c].into_iter());
        assert_eq!(elected, Some(b.id));
    }

    #[test]
    fn no_eligible_watcher_elects_none() {
        let a = watcher(1, None, true);
        let b = watcher(2, Some(10.0), false);
        assert_eq!(elect_reference([&a, &b].into_iter()), None);
    }
}
