use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::user::OnlineUser;

/// Every frame in both directions is `{"type": ..., "content": ...}` where
/// `content` is itself a JSON document encoded as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// Wrap a payload into an envelope. Payloads are plain data structs, so
/// encoding cannot fail in practice; an empty content on failure mirrors the
/// forgiving behavior of the rest of the pipeline.
pub fn envelope<T: Serialize>(kind: &str, payload: &T) -> WsEnvelope {
    WsEnvelope {
        kind: kind.to_string(),
        content: serde_json::to_string(payload).unwrap_or_default(),
    }
}

/// Re-wrap an already-encoded content string, for frames the server relays
/// verbatim (`game_move`, `game_over_checkmate`).
pub fn raw_envelope(kind: &str, content: &str) -> WsEnvelope {
    WsEnvelope {
        kind: kind.to_string(),
        content: content.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKind {
    InvitationSend,
    InvitationAccept,
    InvitationReject,
    InvitationCancel,
    RoomLeave,
}

/// Shared payload of the invitation family. Orientation is always
/// inviter -> invitee regardless of which side is acting; handlers resolve
/// the actor from the session, not from this payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationMessage {
    #[serde(rename = "type")]
    pub kind: InvitationKind,
    #[serde(default)]
    pub from_user_id: String,
    #[serde(default)]
    pub from_username: String,
    #[serde(default)]
    pub to_user_id: String,
    #[serde(default)]
    pub to_username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,
}

/// Inbound `game_move` content. The `move` object and `fen` are opaque to
/// the server; they are trusted and forwarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveMessage {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "fromUserId", default)]
    pub from_user_id: String,
    #[serde(rename = "toUserId", default)]
    pub to_user_id: String,
    #[serde(rename = "toUsername")]
    pub to_username: String,
    #[serde(rename = "move", default)]
    pub played: Value,
    #[serde(default)]
    pub fen: String,
    #[serde(rename = "isWhitesTurn")]
    pub is_whites_turn: bool,
}

/// Inbound `game_over_checkmate` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverMessage {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(default)]
    pub winner: String,
    #[serde(default)]
    pub reason: String,
    #[serde(rename = "winnerId", default)]
    pub winner_id: String,
}

/// Inbound `leave_room` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomRequest {
    pub username: String,
}

/// One entry of a room's move history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Move {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub piece: String,
}

/// Personalized `game_start` content. `positonFen` is misspelled on the
/// wire; clients depend on it as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStartState {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "gameCreatorUid")]
    pub game_creator_uid: String,
    #[serde(rename = "positonFen")]
    pub positon_fen: String,
    #[serde(rename = "winnerId")]
    pub winner_id: String,
    #[serde(rename = "whitesTime")]
    pub whites_time: String,
    #[serde(rename = "blacksTime")]
    pub blacks_time: String,
    #[serde(rename = "isWhitesTurn")]
    pub is_whites_turn: bool,
    #[serde(rename = "isGameOver")]
    pub is_game_over: bool,
    pub moves: Vec<Move>,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "opponentUsername")]
    pub opponent_username: String,
}

/// `time_update` content: integer seconds are the source of truth, the
/// `MM:SS` strings ride along for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeUpdate {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "whiteTime")]
    pub white_time: u64,
    #[serde(rename = "blackTime")]
    pub black_time: u64,
    #[serde(rename = "whitesTime")]
    pub whites_time: String,
    #[serde(rename = "blacksTime")]
    pub blacks_time: String,
    #[serde(rename = "isWhitesTurn")]
    pub is_whites_turn: bool,
}

/// `game_over` content emitted on flag-fall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverBroadcast {
    #[serde(rename = "gameId")]
    pub game_id: String,
    pub winner: String,
    pub reason: String,
    #[serde(rename = "whiteTime")]
    pub white_time: String,
    #[serde(rename = "blackTime")]
    pub black_time: String,
    #[serde(rename = "winnerId")]
    pub winner_id: String,
    #[serde(rename = "isGameOver")]
    pub is_game_over: bool,
    pub status: String,
}

/// `room_closed` content. The mixed key styles are the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomClosed {
    pub room_id: String,
    #[serde(rename = "fromUsername")]
    pub from_username: String,
}

/// Generic `{message}` payload used by `error`, `public_game_timeout` and
/// `public_queue_leave` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
}

/// Build the `online_users` roster envelope.
pub fn online_users_envelope(users: &[OnlineUser]) -> WsEnvelope {
    envelope("online_users", &users)
}
