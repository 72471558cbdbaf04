//! The wire envelope: one JSON object per line, whose top-level keys are
//! command tags, dispatched in the order they appear (spec §4.1).
//!
//! `serde_json`'s `preserve_order` feature backs [`serde_json::Map`] with an
//! `IndexMap`, so iterating a decoded object yields keys in on-the-wire
//! order. A `#[serde(tag = "type")]` enum (the shape the teacher's
//! `ClientMessage`/`ServerMessage` use) can't express "multiple commands
//! share one JSON object", so inbound frames are parsed as a plain
//! `Map<String, Value>` and matched by hand here instead.

use crate::protocol::types::{ClientFeatures, FileInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not a utf-8 string")]
    InvalidUtf8,
    #[error("not a json encoded object: {0}")]
    InvalidJson(String),
    #[error("unrecognized command '{0}'")]
    UnknownTag(String),
    #[error("malformed '{tag}' payload: {reason}")]
    MalformedPayload { tag: &'static str, reason: String },
}

/// One decoded command from an inbound frame, tagged by which top-level key
/// produced it. Order in the returned `Vec` matches the order the keys
/// appeared in the JSON object.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Tls(TlsRequest),
    Hello(HelloRequest),
    Set(Vec<SetSubCommand>),
    List,
    State(StateRequest),
    Chat(String),
    /// Clients do not normally send `Error` frames, but it is one of the
    /// seven recognized tags (spec §4.1) so it is parsed rather than
    /// rejected as unknown; the session layer simply ignores it.
    Error(String),
}

/// Parses one line (already stripped of its `\r\n` terminator and
/// confirmed non-empty) into an ordered list of commands.
pub fn parse_frame(line: &str) -> Result<Vec<ClientCommand>, ProtocolError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ProtocolError::InvalidJson(
            "top-level value is not a JSON object".to_string(),
        ));
    };

    let mut commands = Vec::with_capacity(map.len());
    for (tag, payload) in map {
        commands.push(parse_tag(&tag, payload)?);
    }
    Ok(commands)
}

fn parse_tag(tag: &str, payload: Value) -> Result<ClientCommand, ProtocolError> {
    match tag {
        "TLS" => Ok(ClientCommand::Tls(
            serde_json::from_value(payload).map_err(|e| ProtocolError::MalformedPayload {
                tag: "TLS",
                reason: e.to_string(),
            })?,
        )),
        "Hello" => Ok(ClientCommand::Hello(
            serde_json::from_value(payload).map_err(|e| ProtocolError::MalformedPayload {
                tag: "Hello",
                reason: e.to_string(),
            })?,
        )),
        "Set" => Ok(ClientCommand::Set(parse_set_subcommands(payload)?)),
        "List" => Ok(ClientCommand::List),
        "State" => Ok(ClientCommand::State(
            serde_json::from_value(payload).map_err(|e| ProtocolError::MalformedPayload {
                tag: "State",
                reason: e.to_string(),
            })?,
        )),
        "Chat" => {
            let message = payload.as_str().map(str::to_string).ok_or_else(|| {
                ProtocolError::MalformedPayload {
                    tag: "Chat",
                    reason: "expected a string".to_string(),
                }
            })?;
            Ok(ClientCommand::Chat(message))
        }
        "Error" => {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(ClientCommand::Error(message))
        }
        other => Err(ProtocolError::UnknownTag(other.to_string())),
    }
}

fn parse_set_subcommands(payload: Value) -> Result<Vec<SetSubCommand>, ProtocolError> {
    let Value::Object(map) = payload else {
        return Err(ProtocolError::MalformedPayload {
            tag: "Set",
            reason: "expected a JSON object".to_string(),
        });
    };

    let mut subcommands = Vec::with_capacity(map.len());
    for (key, value) in map {
        let parsed = match key.as_str() {
            "room" => serde_json::from_value(value).map(SetSubCommand::Room),
            "file" => serde_json::from_value(value).map(SetSubCommand::File),
            "controllerAuth" => serde_json::from_value(value).map(SetSubCommand::ControllerAuth),
            "ready" => serde_json::from_value(value).map(SetSubCommand::Ready),
            "playlistChange" => {
                serde_json::from_value(value).map(SetSubCommand::PlaylistChange)
            }
            "playlistIndex" => serde_json::from_value(value).map(SetSubCommand::PlaylistIndex),
            "features" => serde_json::from_value(value).map(SetSubCommand::Features),
            // Unknown Set sub-commands (e.g. from a newer client) are
            // skipped rather than dropping the whole connection — only
            // unrecognized *top-level* tags are fatal (spec §4.1).
            _ => continue,
        };
        match parsed {
            Ok(sub) => subcommands.push(sub),
            Err(e) => {
                return Err(ProtocolError::MalformedPayload {
                    tag: "Set",
                    reason: format!("'{key}': {e}"),
                })
            }
        }
    }
    Ok(subcommands)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsRequest {
    #[serde(rename = "startTLS")]
    pub start_tls: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelloRoomRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelloRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub room: HelloRoomRequest,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub realversion: Option<String>,
    #[serde(default)]
    pub features: Option<ClientFeatures>,
    /// Injected upstream by the optional proxy front-end (spec §4.9); the
    /// core never populates this field itself.
    #[serde(default)]
    pub user_ip: Option<String>,
}

impl HelloRequest {
    /// Prefers `realversion` over `version`, per spec §4.2.
    #[must_use]
    pub fn effective_version(&self) -> Option<&str> {
        self.realversion
            .as_deref()
            .or(self.version.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum SetSubCommand {
    Room(SetRoomRequest),
    File(FileInfo),
    ControllerAuth(ControllerAuthRequest),
    Ready(ReadyRequest),
    PlaylistChange(PlaylistChangeRequest),
    PlaylistIndex(PlaylistIndexRequest),
    Features(ClientFeatures),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoomRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerAuthRequest {
    pub password: String,
    pub room: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyRequest {
    #[serde(rename = "isReady")]
    pub is_ready: bool,
    #[serde(rename = "manuallyInitiated", default)]
    pub manually_initiated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistChangeRequest {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistIndexRequest {
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatePlaystateRequest {
    pub position: f64,
    pub paused: bool,
    #[serde(rename = "doSeek", default)]
    pub do_seek: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatePingRequest {
    #[serde(rename = "latencyCalculation")]
    pub latency_calculation: f64,
    #[serde(rename = "clientRtt", default)]
    pub client_rtt: Option<f64>,
    #[serde(rename = "clientLatencyCalculation", default)]
    pub client_latency_calculation: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IgnoringOnTheFlyRequest {
    #[serde(default)]
    pub server: Option<u32>,
    #[serde(default)]
    pub client: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateRequest {
    #[serde(default)]
    pub playstate: Option<StatePlaystateRequest>,
    #[serde(default)]
    pub ping: StatePingRequest,
    #[serde(rename = "ignoringOnTheFly", default)]
    pub ignoring_on_the_fly: IgnoringOnTheFlyRequest,
}

// ---------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------

/// Anything the server can emit on a connection. Serializes to exactly one
/// line: a single-key JSON object tagged by variant name, `\r\n`-terminated.
#[derive(Debug, Clone, Serialize)]
pub enum ServerFrame {
    TLS(TlsResponse),
    Hello(HelloResponse),
    Set(Box<SetResponse>),
    List(ListResponse),
    State(Box<StateResponse>),
    Chat(ChatResponse),
    Error(ErrorResponse),
}

impl ServerFrame {
    /// Renders this frame as a single `\r\n`-terminated line.
    ///
    /// # Errors
    /// Returns an error only if the payload somehow fails to serialize,
    /// which does not happen for any value this crate constructs.
    pub fn encode(&self) -> serde_json::Result<String> {
        let (tag, payload) = match self {
            Self::TLS(p) => ("TLS", serde_json::to_value(p)?),
            Self::Hello(p) => ("Hello", serde_json::to_value(p)?),
            Self::Set(p) => ("Set", serde_json::to_value(p)?),
            Self::List(p) => ("List", serde_json::to_value(p)?),
            Self::State(p) => ("State", serde_json::to_value(p)?),
            Self::Chat(p) => ("Chat", serde_json::to_value(p)?),
            Self::Error(p) => ("Error", serde_json::to_value(p)?),
        };
        let mut object = serde_json::Map::with_capacity(1);
        object.insert(tag.to_string(), payload);
        let mut line = serde_json::to_string(&Value::Object(object))?;
        line.push_str("\r\n");
        Ok(line)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TlsResponse {
    #[serde(rename = "startTLS")]
    pub start_tls: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HelloRoomResponse {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloResponse {
    pub username: String,
    pub room: HelloRoomResponse,
    pub version: String,
    pub realversion: &'static str,
    pub motd: String,
    pub features: crate::protocol::types::ServerFeatureSet,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<SetRoomResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SetUserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<SetFileResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<SetReadyResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_change: Option<SetPlaylistChangeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_index: Option<SetPlaylistIndexResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_auth: Option<SetControllerAuthResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_controlled_room: Option<SetNewControlledRoomResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetRoomResponse {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserResponse {
    pub username: String,
    pub room: SetRoomResponse,
    pub event: SetUserEvent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFileResponse {
    pub username: String,
    pub file: FileInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReadyResponse {
    pub username: String,
    pub is_ready: bool,
    pub manually_initiated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetPlaylistChangeResponse {
    pub user: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetPlaylistIndexResponse {
    pub user: String,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetControllerAuthResponse {
    pub username: String,
    pub room: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_controller: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNewControlledRoomResponse {
    pub password: String,
    pub room_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse(pub std::collections::HashMap<String, Vec<ListUserEntry>>);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserEntry {
    pub username: String,
    pub room: SetRoomResponse,
    pub file: Option<FileInfo>,
    pub is_controller: bool,
    pub is_ready: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePlaystateResponse {
    pub position: f64,
    pub paused: bool,
    #[serde(rename = "doSeek")]
    pub do_seek: bool,
    pub set_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePingResponse {
    pub latency_calculation: f64,
    pub server_rtt: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_latency_calculation: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IgnoringOnTheFlyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub playstate: StatePlaystateResponse,
    pub ping: StatePingResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignoring_on_the_fly: Option<IgnoringOnTheFlyResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hello_frame() {
        let line = r#"{"Hello":{"username":"ann","room":{"name":"r1"},"version":"1.6.5"}}"#;
        let commands = parse_frame(line).unwrap();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            ClientCommand::Hello(hello) => {
                assert_eq!(hello.username, "ann");
                assert_eq!(hello.room.name, "r1");
                assert_eq!(hello.effective_version(), Some("1.6.5"));
            }
            other => panic!("expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn dispatches_multiple_top_level_tags_in_order() {
        let line = r#"{"Chat":"hi","List":{}}"#;
        let commands = parse_frame(line).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], ClientCommand::Chat(_)));
        assert!(matches!(commands[1], ClientCommand::List));
    }

    #[test]
    fn unknown_top_level_tag_is_rejected() {
        let line = r#"{"Bogus":{}}"#;
        let err = parse_frame(line).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag(tag) if tag == "Bogus"));
    }

    #[test]
    fn set_subcommands_parse_known_keys_and_skip_unknown() {
        let line = r#"{"Set":{"ready":{"isReady":true},"somethingNew":{"x":1}}}"#;
        let commands = parse_frame(line).unwrap();
        let ClientCommand::Set(subs) = &commands[0] else {
            panic!("expected Set")
        };
        assert_eq!(subs.len(), 1);
        assert!(matches!(subs[0], SetSubCommand::Ready(_)));
    }

    #[test]
    fn invalid_json_line_is_rejected() {
        let line = "not json";
        assert!(parse_frame(line).is_err());
    }

    #[test]
    fn server_frame_encodes_single_tag_object() {
        let frame = ServerFrame::Chat(ChatResponse {
            username: "ann".to_string(),
            message: "hi".to_string(),
        });
        let line = frame.encode().unwrap();
        assert!(line.starts_with(r#"{"Chat":{"username":"ann","message":"hi"}}"#));
        assert!(line.ends_with("\r\n"));
    }
}
