//! Security utilities: the controlled-room hash scheme, wire-compatible
//! server-password comparison, and the in-band TLS context lifecycle
//! (spec §4.6, §4.10).

pub mod hash;
pub mod tls;

pub use hash::{
    check_controller_password, controlled_room_hash, generate_password, generate_salt,
    is_controlled_room_name, password_matches_format, server_password_matches,
    ControlledRoomError,
};
pub use tls::{TlsContext, TlsError, TLS_CERT_ROTATION_MAX_RETRIES};
