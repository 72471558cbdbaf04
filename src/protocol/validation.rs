//! Text truncation, playlist bounds, and version-gated feature thresholds
//! (spec §4.5, §4.8).

/// `CHAT_MIN_VERSION` / `FEATURE_LIST_MIN_VERSION` from the original
/// implementation's `constants.py`.
pub const MIN_VERSION_CHAT: &str = "1.5.0";
/// `USER_READY_MIN_VERSION`.
pub const MIN_VERSION_READINESS: &str = "1.3.0";
/// `SHARED_PLAYLIST_MIN_VERSION`.
pub const MIN_VERSION_PLAYLISTS: &str = "1.4.0";
/// `CONTROLLED_ROOMS_MIN_VERSION`.
pub const MIN_VERSION_MANAGED_ROOMS: &str = "1.3.0";
/// `RECENT_CLIENT_THRESHOLD`: clients at or above this version are not
/// nagged with the MOTD's old-client warning.
pub const RECENT_CLIENT_THRESHOLD: &str = "1.6.5";

/// `truncateText` from the original implementation, minus the lossy
/// byte-oriented re-encode dance: Rust strings are already valid UTF-8, so
/// truncation only has to stay on a `char` boundary.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// `playlistIsValid`: bounds both item count and total character load, so a
/// playlist change can't force every watcher in the room to buffer an
/// unbounded broadcast.
#[must_use]
pub fn playlist_is_valid(files: &[String], max_items: usize, max_characters: usize) -> bool {
    if files.len() > max_items {
        return false;
    }
    files.iter().map(String::len).sum::<usize>() <= max_characters
}

/// `meetsMinVersion`: dotted-integer version comparison (`"1.10.0" >
/// "1.9.0"`, unlike a naive string compare). A version string that fails to
/// parse as dotted integers is treated as not meeting the threshold rather
/// than panicking.
#[must_use]
pub fn meets_min_version(version: &str, min_version: &str) -> bool {
    fn parse(v: &str) -> Option<Vec<u64>> {
        v.split('.').map(|part| part.parse().ok()).collect()
    }
    match (parse(version), parse(min_version)) {
        (Some(v), Some(min)) => v >= min,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("日本語テスト", 3), "日本語");
    }

    #[test]
    fn playlist_validity_checks_both_bounds() {
        let small = vec!["a.mkv".to_string(), "b.mkv".to_string()];
        assert!(playlist_is_valid(&small, 250, 10_000));

        let too_many: Vec<String> = (0..5).map(|i| format!("f{i}.mkv")).collect();
        assert!(!playlist_is_valid(&too_many, 4, 10_000));

        let too_long = vec!["x".repeat(20)];
        assert!(!playlist_is_valid(&too_long, 250, 10));
    }

    #[test]
    fn version_comparison_is_numeric_not_lexicographic() {
        assert!(meets_min_version("1.10.0", "1.9.0"));
        assert!(meets_min_version("1.5.0", "1.5.0"));
        assert!(!meets_min_version("1.4.9", "1.5.0"));
    }

    #[test]
    fn unparseable_version_does_not_meet_threshold() {
        assert!(!meets_min_version("not-a-version", "1.5.0"));
        assert!(!meets_min_version("1.5.0", "not-a-version"));
    }

    #[test]
    fn recent_client_threshold_gates_old_client_warning() {
        assert!(meets_min_version("1.6.5", RECENT_CLIENT_THRESHOLD));
        assert!(!meets_min_version("1.6.4", RECENT_CLIENT_THRESHOLD));
    }
}
