//! Room-synchronization server behavior configuration.

use super::defaults::{
    default_disable_chat, default_disable_ready, default_isolate_rooms,
    default_max_chat_message_length, default_max_filename_length, default_max_room_name_length,
    default_max_username_length, default_warn_old_clients,
};
use serde::{Deserialize, Serialize};

/// Settings that govern the protocol-level behavior of the room
/// synchronization engine (spec §6 "Configuration inputs").
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Plaintext server password; compared against the client's MD5 hash.
    /// `None` disables the password check entirely.
    #[serde(default)]
    pub password: Option<String>,

    /// Path to a MOTD template file. Missing or unreadable files leave the
    /// MOTD field empty rather than erroring.
    #[serde(default)]
    pub motd_file_path: Option<String>,

    /// When true, broadcasts do not cross room boundaries and
    /// `getAllWatchersForUser` is restricted to the caller's own room.
    #[serde(default = "default_isolate_rooms")]
    pub isolate_rooms: bool,

    /// Server-scoped secret used when deriving controlled-room hashes. If
    /// absent, ten random uppercase letters are generated at startup.
    #[serde(default)]
    pub salt: Option<String>,

    #[serde(default = "default_disable_ready")]
    pub disable_ready: bool,

    #[serde(default = "default_disable_chat")]
    pub disable_chat: bool,

    #[serde(default = "default_max_chat_message_length")]
    pub max_chat_message_length: usize,

    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,

    #[serde(default = "default_max_room_name_length")]
    pub max_room_name_length: usize,

    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,

    /// Path to a SQLite database file the external stats snapshotter writes
    /// to. `None` disables periodic snapshotting entirely.
    #[serde(default)]
    pub stats_db_file: Option<String>,

    /// Whether to prepend an upgrade warning to the MOTD for clients older
    /// than `RECENT_CLIENT_THRESHOLD`.
    #[serde(default = "default_warn_old_clients")]
    pub warn_old_clients: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            password: None,
            motd_file_path: None,
            isolate_rooms: default_isolate_rooms(),
            salt: None,
            disable_ready: default_disable_ready(),
            disable_chat: default_disable_chat(),
            max_chat_message_length: default_max_chat_message_length(),
            max_username_length: default_max_username_length(),
            max_room_name_length: default_max_room_name_length(),
            max_filename_length: default_max_filename_length(),
            stats_db_file: None,
            warn_old_clients: default_warn_old_clients(),
        }
    }
}
