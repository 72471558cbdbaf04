//! The synchronization engine: watcher/room data model (spec §3), position
//! reconciliation (spec §4.4), and the single-actor `RoomManager` that owns
//! all of it (spec §5).

pub mod manager;
pub mod room;
pub mod watcher;

pub use manager::{Command, HelloOutcome, RoomManager, RoomManagerHandle, PROTOCOL_TIMEOUT_SECS};
pub use room::{state_frame_for, PlayState, Room, SERVER_STATE_INTERVAL_SECS};
pub use watcher::{elect_reference, Outbox, Watcher};
