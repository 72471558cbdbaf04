//! Wire protocol: the line envelope (spec §4.1), message shapes (spec §3,
//! §4.2-§4.5), and the validation/version-gating rules layered on top.

pub mod messages;
pub mod types;
pub mod validation;

pub use messages::{
    ChatResponse, ClientCommand, ControllerAuthRequest, ErrorResponse, HelloRequest,
    HelloResponse, HelloRoomRequest, HelloRoomResponse, IgnoringOnTheFlyRequest, IgnoringOnTheFlyResponse,
    ListResponse, ListUserEntry, PlaylistChangeRequest, PlaylistIndexRequest, ProtocolError,
    ReadyRequest, ServerFrame, SetControllerAuthResponse, SetFileResponse,
    SetNewControlledRoomResponse, SetPlaylistChangeResponse, SetPlaylistIndexResponse,
    SetReadyResponse, SetResponse, SetRoomRequest, SetRoomResponse, SetSubCommand, SetUserEvent,
    SetUserResponse, StatePingRequest, StatePingResponse, StatePlaystateRequest,
    StatePlaystateResponse, StateRequest, StateResponse, TlsRequest, TlsResponse, parse_frame,
};
pub use types::{
    ClientFeatures, ConnectionId, FileInfo, PingState, Readiness, RoomSnapshot, ServerFeatureSet,
};
pub use validation::{
    MIN_VERSION_CHAT, MIN_VERSION_MANAGED_ROOMS, MIN_VERSION_PLAYLISTS, MIN_VERSION_READINESS,
    RECENT_CLIENT_THRESHOLD, meets_min_version, playlist_is_valid, truncate_chars,
};
