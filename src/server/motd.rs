//! MOTD templating (spec §4.7): `$version`/`$userIp`/`$username`/`$room`
//! placeholder substitution, the old-client upgrade banner, and the hard
//! length cap that falls back to a canned overflow message.

use super::catalog::get_message;
use crate::protocol::{meets_min_version, RECENT_CLIENT_THRESHOLD};

/// `SERVER_MAX_TEMPLATE_LENGTH`.
pub const SERVER_MAX_TEMPLATE_LENGTH: usize = 10_000;

pub struct MotdContext<'a> {
    pub version: &'a str,
    pub user_ip: &'a str,
    pub username: &'a str,
    pub room: &'a str,
}

/// Renders `template` (the raw contents of the configured MOTD file, if
/// any) against `ctx`, prepending the old-client warning when
/// `warn_old_clients` is set and the client predates
/// [`RECENT_CLIENT_THRESHOLD`]. Returns the empty string when there is no
/// template and no warning to show.
#[must_use]
pub fn render(template: Option<&str>, warn_old_clients: bool, ctx: &MotdContext<'_>) -> String {
    let mut rendered = match template {
        Some(t) => match substitute(t, ctx) {
            Ok(s) => s,
            Err(()) => return get_message("motd-template-error").to_string(),
        },
        None => String::new(),
    };

    if warn_old_clients && !meets_min_version(ctx.version, RECENT_CLIENT_THRESHOLD) {
        let warning = get_message("old-client-warning");
        rendered = if rendered.is_empty() {
            warning.to_string()
        } else {
            format!("{warning}\n{rendered}")
        };
    }

    if rendered.len() >= SERVER_MAX_TEMPLATE_LENGTH {
        return get_message("motd-overflow").to_string();
    }
    rendered
}

/// Replaces `$name` placeholders; any name other than the four recognized
/// ones (including an empty `$` with no following identifier) is an error.
fn substitute(template: &str, ctx: &MotdContext<'_>) -> Result<String, ()> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let value = match name.as_str() {
            "version" => ctx.version,
            "userIp" => ctx.user_ip,
            "username" => ctx.username,
            "room" => ctx.room,
            _ => return Err(()),
        };
        out.push_str(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> MotdContext<'a> {
        MotdContext {
            version: "1.2.0",
            user_ip: "127.0.0.1",
            username: "ann",
            room: "r1",
        }
    }

    #[test]
    fn substitutes_all_known_placeholders() {
        let rendered = render(
            Some("Welcome $username to $room, running $version from $userIp"),
            false,
            &ctx(),
        );
        assert_eq!(rendered, "Welcome ann to r1, running 1.2.0 from 127.0.0.1");
    }

    #[test]
    fn unresolved_placeholder_yields_canned_error() {
        let rendered = render(Some("hello $bogus"), false, &ctx());
        assert_eq!(rendered, get_message("motd-template-error"));
    }

    #[test]
    fn old_client_gets_warning_prepended() {
        let rendered = render(Some("welcome"), true, &ctx());
        assert!(rendered.starts_with(get_message("old-client-warning")));
        assert!(rendered.ends_with("welcome"));
    }

    #[test]
    fn recent_client_gets_no_warning() {
        let recent = MotdContext {
            version: "1.6.5",
            ..ctx()
        };
        let rendered = render(Some("welcome"), true, &recent);
        assert_eq!(rendered, "welcome");
    }

    #[test]
    fn no_template_and_no_warning_is_empty() {
        assert_eq!(render(None, false, &ctx()), "");
    }

    #[test]
    fn oversized_template_yields_overflow_message() {
        let huge = "x".repeat(SERVER_MAX_TEMPLATE_LENGTH + 1);
        let rendered = render(Some(&huge), false, &ctx());
        assert_eq!(rendered, get_message("motd-overflow"));
    }
}
