//! TLS context configuration.

use serde::{Deserialize, Serialize};

/// Certificate source for the in-band TLS upgrade (spec §4.10).
///
/// Certificates live under a single directory and are reloaded whenever
/// their mtime changes, guarded by
/// [`TLS_CERT_ROTATION_MAX_RETRIES`](crate::security::tls::TLS_CERT_ROTATION_MAX_RETRIES).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TlsConfig {
    /// Directory containing `privkey.pem` + `fullchain.pem`, or
    /// `cert.pem` + `chain.pem`. `None` disables TLS entirely: `TLS`
    /// requests are answered with `{"startTLS": "false"}`.
    #[serde(default)]
    pub cert_path: Option<String>,
}
