//! Configuration validation.

use super::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configured salt '{0}' is shorter than 4 characters; controlled-room hashes would be weak")]
    SaltTooShort(String),
    #[error("max_chat_message_length must be > 0")]
    ZeroChatLength,
    #[error("max_username_length must be > 0")]
    ZeroUsernameLength,
    #[error("tls.cert_path is set but does not exist: {0}")]
    TlsPathMissing(String),
}

/// Warn-only security/sanity checks over a resolved [`Config`]. Used both by
/// [`super::loader::load`] (warn to stderr) and by the `--validate-config`
/// CLI flag (which treats any error as fatal).
pub fn validate_config_security(config: &Config) -> Result<(), ConfigError> {
    if let Some(salt) = &config.server.salt {
        if salt.len() < 4 {
            return Err(ConfigError::SaltTooShort(salt.clone()));
        }
    }
    if config.server.max_chat_message_length == 0 {
        return Err(ConfigError::ZeroChatLength);
    }
    if config.server.max_username_length == 0 {
        return Err(ConfigError::ZeroUsernameLength);
    }
    if let Some(path) = &config.tls.cert_path {
        if !std::path::Path::new(path).exists() {
            return Err(ConfigError::TlsPathMissing(path.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config_security(&Config::default()).is_ok());
    }

    #[test]
    fn short_salt_is_rejected() {
        let mut config = Config::default();
        config.server.salt = Some("ab".to_string());
        assert!(matches!(
            validate_config_security(&config),
            Err(ConfigError::SaltTooShort(_))
        ));
    }
}
