//! The localized message catalog out-of-scope collaborator (spec §1,
//! SPEC_FULL §4.12): `getMessage(key) -> &str`. The core only ever calls
//! this function and never sees that it happens to be a small static
//! English table rather than a real i18n backend.

/// Looks up a canned message. Unknown keys return an empty string rather
/// than panicking, matching `Option`-like lookup semantics without forcing
/// every call site to unwrap.
#[must_use]
pub fn get_message(key: &str) -> &'static str {
    match key {
        "motd-overflow" => "(MOTD omitted: it exceeds the maximum template length)",
        "motd-template-error" => "(MOTD omitted: the template contains an unresolved placeholder)",
        "old-client-warning" => {
            "Your Syncplay client is outdated and may not work correctly with this server; please upgrade."
        }
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_yields_empty_string() {
        assert_eq!(get_message("no-such-key"), "");
    }

    #[test]
    fn known_keys_are_non_empty() {
        assert!(!get_message("motd-overflow").is_empty());
        assert!(!get_message("motd-template-error").is_empty());
        assert!(!get_message("old-client-warning").is_empty());
    }
}
