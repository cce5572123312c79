use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user record as persisted in `users/users.json`.
///
/// The `isnOline` key is misspelled on disk; it is part of the on-disk
/// contract and must not be corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(rename = "isnOline")]
    pub is_online: bool,
    #[serde(rename = "isInRoom")]
    pub is_in_room: bool,
}

impl UserProfile {
    pub fn new(username: &str) -> Self {
        UserProfile {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            is_online: false,
            is_in_room: false,
        }
    }
}

/// The HTTP-facing shape of a user record. Unlike the stored profile this
/// one spells `isOnline` correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    #[serde(rename = "isOnline")]
    pub is_online: bool,
    #[serde(rename = "isInRoom")]
    pub is_in_room: bool,
}

impl From<UserProfile> for UserResponse {
    fn from(user: UserProfile) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            is_online: user.is_online,
            is_in_room: user.is_in_room,
        }
    }
}

/// Entry of the `online_users` roster broadcast, and the per-color player
/// record inside rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub id: String,
    pub username: String,
    #[serde(rename = "isInRoom")]
    pub is_in_room: bool,
}
