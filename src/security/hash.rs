//! Controlled-room name hashing and the wire-compatible server-password
//! comparison (spec §4.6).
//!
//! Room name shape: `+<base>:<12-hex>`. The trailing 12 hex digits are
//! produced uppercase by [`controlled_room_hash`] (matching both the
//! formula in spec §4.6 and the original implementation's
//! `.hexdigest()[:12].upper()`); room names are therefore matched
//! case-insensitively on the hash segment rather than the spec prose's
//! literal `[0-9a-f]{12}`, which would reject the hashes this very formula
//! produces — see DESIGN.md.

use md5::Md5;
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// `PASSWORD_REGEX` from the original implementation: two uppercase
/// letters, a dash, three digits, a dash, three digits (e.g. `AA-123-456`).
fn password_matches_format_str(password: &str) -> bool {
    let bytes = password.as_bytes();
    bytes.len() == 9
        && bytes[0].is_ascii_uppercase()
        && bytes[1].is_ascii_uppercase()
        && bytes[2] == b'-'
        && bytes[3].is_ascii_digit()
        && bytes[4].is_ascii_digit()
        && bytes[5].is_ascii_digit()
        && bytes[6] == b'-'
        && bytes[7].is_ascii_digit()
        && bytes[8].is_ascii_digit()
}

#[must_use]
pub fn password_matches_format(password: &str) -> bool {
    password_matches_format_str(password)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlledRoomError {
    #[error("password does not match the required AA-123-456 format")]
    BadPasswordFormat,
}

/// `CONTROLLED_ROOM_REGEX` from spec §4.3: `^\+(.*):([0-9a-f]{12})$`,
/// relaxed to case-insensitive hex per the module doc comment above.
/// Returns `(base, hash)` with `hash` left in whatever case the caller sent.
#[must_use]
pub fn is_controlled_room_name(room_name: &str) -> Option<(&str, &str)> {
    let rest = room_name.strip_prefix('+')?;
    let colon_idx = rest.rfind(':')?;
    let (base, hash_with_colon) = rest.split_at(colon_idx);
    let hash = &hash_with_colon[1..];
    if hash.len() == 12 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some((base, hash))
    } else {
        None
    }
}

/// `RoomPasswordProvider._computeRoomHash` (spec §4.6):
/// ```text
/// salt_hex  = SHA-256(salt).hexdigest
/// prov_hex  = SHA-256(base ‖ salt_hex).hexdigest
/// hash12    = SHA-1(prov_hex ‖ salt_hex ‖ password).hexdigest[:12].upper
/// ```
#[must_use]
pub fn controlled_room_hash(base: &str, password: &str, salt: &str) -> String {
    let salt_hex = hex::encode(Sha256::digest(salt.as_bytes()));
    let mut provisional = Sha256::new();
    provisional.update(base.as_bytes());
    provisional.update(salt_hex.as_bytes());
    let prov_hex = hex::encode(provisional.finalize());

    let mut outer = Sha1::new();
    outer.update(prov_hex.as_bytes());
    outer.update(salt_hex.as_bytes());
    outer.update(password.as_bytes());
    let digest_hex = hex::encode(outer.finalize());
    digest_hex[..12].to_ascii_uppercase()
}

/// Checks a controller-auth request against a room name. Returns:
/// - `Ok(Some(room_name))` with the correctly-hashed room name when the
///   caller is not yet in a controlled room (so the session layer can
///   reply `newControlledRoom`).
/// - `Ok(None)` when `room_name` is already the correctly-hashed controlled
///   room name (the caller already has the right name; the session layer
///   only needs to add them to `controllers`).
/// - `Err` when the password fails the format check, or the room name *is*
///   controlled-shaped but the hash does not match this password/salt.
pub fn check_controller_password(
    room_name: &str,
    password: &str,
    salt: &str,
) -> Result<Option<String>, ControlledRoomError> {
    if !password_matches_format_str(password) {
        return Err(ControlledRoomError::BadPasswordFormat);
    }

    match is_controlled_room_name(room_name) {
        Some((base, hash)) => {
            let computed = controlled_room_hash(base, password, salt);
            if hash.eq_ignore_ascii_case(&computed) {
                Ok(None)
            } else {
                Err(ControlledRoomError::BadPasswordFormat)
            }
        }
        None => {
            let hash = controlled_room_hash(room_name, password, salt);
            Ok(Some(format!("+{room_name}:{hash}")))
        }
    }
}

/// Generates a room password in the `AA-123-456` shape. Each letter and
/// digit is drawn independently — the original implementation's
/// `_get_random_numbers` called a single-element chooser with `k=quantity`,
/// which silently produced `quantity` copies of *one* digit rather than
/// `quantity` independent digits (spec §9 "ambiguity" note). This generates
/// `quantity` independent draws.
#[must_use]
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    let letters: String = (0..2)
        .map(|_| (b'A' + rng.random_range(0..26)) as char)
        .collect();
    let first: String = (0..3)
        .map(|_| char::from_digit(rng.random_range(0..10), 10).unwrap_or('0'))
        .collect();
    let second: String = (0..3)
        .map(|_| char::from_digit(rng.random_range(0..10), 10).unwrap_or('0'))
        .collect();
    format!("{letters}-{first}-{second}")
}

/// Generates a 10-letter uppercase server salt, used when no salt is
/// configured (spec §4.6 "Server salt").
#[must_use]
pub fn generate_salt() -> String {
    let mut rng = rand::rng();
    (0..10)
        .map(|_| (b'A' + rng.random_range(0..26)) as char)
        .collect()
}

/// Wire-compatible server-password comparison: MD5 is part of the protocol
/// contract with existing clients, not a security primitive, and must be
/// preserved bit-exact (spec §9 design notes). `supplied_md5_hex` is
/// whatever hex string the client sent; `configured_password` is the
/// server's plaintext password.
#[must_use]
pub fn server_password_matches(configured_password: &str, supplied_md5_hex: &str) -> bool {
    let expected = hex::encode(Md5::digest(configured_password.as_bytes()));
    expected.eq_ignore_ascii_case(supplied_md5_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_controlled_room_name() {
        let salt = "ABCDEFGHIJ";
        let password = "AA-123-456";
        let room_name = check_controller_password("movienight", password, salt)
            .unwrap()
            .unwrap();
        assert!(room_name.starts_with("+movienight:"));

        // Re-checking the produced name against the same password succeeds
        // and signals "already correctly named" via `Ok(None)`.
        assert_eq!(
            check_controller_password(&room_name, password, salt),
            Ok(None)
        );
    }

    #[test]
    fn wrong_password_against_controlled_name_fails() {
        let salt = "ABCDEFGHIJ";
        let room_name =
            check_controller_password("movienight", "AA-123-456", salt).unwrap().unwrap();
        assert!(check_controller_password(&room_name, "ZZ-999-999", salt).is_err());
    }

    #[test]
    fn bad_password_format_is_rejected_regardless_of_room_name() {
        assert_eq!(
            check_controller_password("movienight", "not-a-password", "salt"),
            Err(ControlledRoomError::BadPasswordFormat)
        );
    }

    #[test]
    fn is_controlled_room_name_parses_base_and_hash() {
        assert_eq!(
            is_controlled_room_name("+movie night:0123456789ab"),
            Some(("movie night", "0123456789ab"))
        );
        assert_eq!(is_controlled_room_name("plain-room"), None);
        assert_eq!(is_controlled_room_name("+short:abc"), None);
    }

    #[test]
    fn server_password_matches_is_case_insensitive_hex() {
        let expected = hex::encode(Md5::digest(b"hunter2"));
        assert!(server_password_matches("hunter2", &expected));
        assert!(server_password_matches("hunter2", &expected.to_uppercase()));
        assert!(!server_password_matches("hunter2", "deadbeef"));
    }

    #[test]
    fn generated_password_matches_required_format() {
        for _ in 0..50 {
            assert!(password_matches_format(&generate_password()));
        }
    }

    #[test]
    fn generated_salt_is_ten_uppercase_letters() {
        let salt = generate_salt();
        assert_eq!(salt.len(), 10);
        assert!(salt.chars().all(|c| c.is_ascii_uppercase()));
    }
}
