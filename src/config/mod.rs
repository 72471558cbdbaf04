//! Configuration module for the Syncplay-compatible server.
//!
//! This module provides layered configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Stdin input
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Room-synchronization behavior (password, salt, length limits)
//! - [`security`]: TLS certificate source
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use security::TlsConfig;
pub use server::ServerConfig;
pub use types::Config;
pub use validation::{validate_config_security, ConfigError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8999);
        assert!(config.server.password.is_none());
        assert!(!config.server.isolate_rooms);
        assert!(!config.server.disable_ready);
        assert!(!config.server.disable_chat);
        assert_eq!(config.server.max_chat_message_length, 150);
        assert_eq!(config.server.max_username_length, 150);
        assert_eq!(config.server.max_room_name_length, 35);
        assert_eq!(config.server.max_filename_length, 250);
        assert!(config.tls.cert_path.is_none());

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "syncplay-server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.server.max_chat_message_length,
            deserialized.server.max_chat_message_length
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
