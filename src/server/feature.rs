//! Version-gated feature negotiation (spec §4.8): the capability bag
//! advertised to a client on Hello, built from `meetsMinVersion` checks
//! against the client's reported version.

use crate::config::ServerConfig;
use crate::protocol::{
    meets_min_version, ServerFeatureSet, MIN_VERSION_CHAT, MIN_VERSION_MANAGED_ROOMS,
    MIN_VERSION_PLAYLISTS, MIN_VERSION_READINESS,
};

/// Builds the `FeatureSet` the server echoes back in its Hello reply (spec
/// §3 `FeatureSet`, §4.8). `chat`/`readiness` also fold in the server-side
/// disable switches, since there's no point advertising a feature the
/// server has been configured to ignore.
#[must_use]
pub fn build_feature_set(config: &ServerConfig, client_version: &str) -> ServerFeatureSet {
    ServerFeatureSet {
        shared_playlists: meets_min_version(client_version, MIN_VERSION_PLAYLISTS),
        chat: !config.disable_chat && meets_min_version(client_version, MIN_VERSION_CHAT),
        feature_list: meets_min_version(client_version, MIN_VERSION_CHAT),
        readiness: !config.disable_ready
            && meets_min_version(client_version, MIN_VERSION_READINESS),
        managed_rooms: meets_min_version(client_version, MIN_VERSION_MANAGED_ROOMS),
        max_chat_message_length: config.max_chat_message_length,
        max_username_length: config.max_username_length,
        max_room_name_length: config.max_room_name_length,
        max_filename_length: config.max_filename_length,
        isolate_rooms: config.isolate_rooms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_client_does_not_get_chat_or_playlists() {
        let config = ServerConfig::default();
        let features = build_feature_set(&config, "1.2.0");
        assert!(!features.chat);
        assert!(!features.shared_playlists);
        assert!(!features.managed_rooms);
    }

    #[test]
    fn recent_client_gets_every_feature() {
        let config = ServerConfig::default();
        let features = build_feature_set(&config, "1.6.5");
        assert!(features.chat);
        assert!(features.shared_playlists);
        assert!(features.readiness);
        assert!(features.managed_rooms);
    }

    #[test]
    fn disabled_switches_override_version_gate() {
        let mut config = ServerConfig::default();
        config.disable_chat = true;
        config.disable_ready = true;
        let features = build_feature_set(&config, "1.6.5");
        assert!(!features.chat);
        assert!(!features.readiness);
    }
}
