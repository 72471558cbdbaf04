//! Default value functions for configuration fields.
//!
//! This module contains all the default value functions used by serde's
//! `#[serde(default = ...)]` attributes throughout the configuration system.

use super::logging::LogFormat;

// =============================================================================
// Port & root config
// =============================================================================

pub const fn default_port() -> u16 {
    8999
}

pub const fn default_isolate_rooms() -> bool {
    false
}

pub const fn default_disable_ready() -> bool {
    false
}

pub const fn default_disable_chat() -> bool {
    false
}

/// `MAX_CHAT_MESSAGE_LENGTH` in the original implementation: number of
/// displayed characters, used by the server until overridden by config.
pub const fn default_max_chat_message_length() -> usize {
    150
}

/// `MAX_USERNAME_LENGTH`.
pub const fn default_max_username_length() -> usize {
    150
}

/// `MAX_ROOM_NAME_LENGTH`.
pub const fn default_max_room_name_length() -> usize {
    35
}

/// `MAX_FILENAME_LENGTH`.
pub const fn default_max_filename_length() -> usize {
    250
}

pub const fn default_playlist_max_items() -> usize {
    250
}

pub const fn default_playlist_max_characters() -> usize {
    10_000
}

pub const fn default_protocol_timeout_secs() -> f64 {
    12.5
}

pub const fn default_server_state_interval_secs() -> f64 {
    1.0
}

pub const fn default_stats_snapshot_interval_secs() -> u64 {
    3600
}

pub const fn default_ping_moving_average_weight() -> f64 {
    0.85
}

pub const fn default_tls_cert_rotation_max_retries() -> u32 {
    10
}

pub const fn default_warn_old_clients() -> bool {
    true
}

// =============================================================================
// Logging defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "syncplay-server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
