use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::messages::InvitationMessage;
use crate::models::user::OnlineUser;
use crate::services::timeout::Timeout;

/// Bookkeeping record of an outstanding invitation. Never carries
/// connections and never appears in broadcasts; it either becomes a game
/// room on accept or evaporates on reject/cancel/timeout.
pub struct TempRoom {
    pub room_id: String,
    pub white_player: OnlineUser,
    pub black_player: OnlineUser,
    pub created_at: DateTime<Utc>,
    timeout: Arc<Timeout>,
}

impl TempRoom {
    pub fn invitation_timeout(&self) -> &Arc<Timeout> {
        &self.timeout
    }
}

/// Registry of pending invitations keyed by room id.
pub struct TempRoomRegistry {
    rooms: RwLock<HashMap<String, Arc<TempRoom>>>,
}

impl TempRoomRegistry {
    pub fn new() -> Self {
        TempRoomRegistry {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Record a pending invitation. The caller arms the timeout.
    pub async fn create(
        &self,
        invitation: &InvitationMessage,
        timeout: Arc<Timeout>,
    ) -> Arc<TempRoom> {
        let room = Arc::new(TempRoom {
            room_id: invitation.room_id.clone(),
            white_player: OnlineUser {
                id: invitation.from_user_id.clone(),
                username: invitation.from_username.clone(),
                is_in_room: false,
            },
            black_player: OnlineUser {
                id: invitation.to_user_id.clone(),
                username: invitation.to_username.clone(),
                is_in_room: false,
            },
            created_at: Utc::now(),
            timeout,
        });

        self.rooms
            .write()
            .await
            .insert(room.room_id.clone(), Arc::clone(&room));
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<TempRoom>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Drop the record, stopping its timeout first. Exactly one stop runs
    /// per room no matter which exit path wins.
    pub async fn remove(&self, room_id: &str) -> Option<Arc<TempRoom>> {
        let room = self.rooms.write().await.remove(room_id);
        if let Some(room) = &room {
            room.timeout.stop().await;
        }
        room
    }
}

impl Default for TempRoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::messages::InvitationKind;
    use std::time::Duration;

    fn invitation(room_id: &str) -> InvitationMessage {
        InvitationMessage {
            kind: InvitationKind::InvitationSend,
            from_user_id: "id-alice".to_string(),
            from_username: "alice".to_string(),
            to_user_id: "id-bob".to_string(),
            to_username: "bob".to_string(),
            room_id: room_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = TempRoomRegistry::new();
        let timeout = Arc::new(Timeout::new(Duration::from_secs(20), async {}));

        registry.create(&invitation("r1"), timeout).await;

        let room = registry.get("r1").await.expect("room stored");
        assert_eq!(room.white_player.username, "alice");
        assert_eq!(room.black_player.username, "bob");
    }

    #[tokio::test]
    async fn test_remove_stops_timeout() {
        let registry = TempRoomRegistry::new();
        let timeout = Arc::new(Timeout::new(Duration::from_secs(20), async {}));
        registry.create(&invitation("r1"), Arc::clone(&timeout)).await;

        let removed = registry.remove("r1").await;
        assert!(removed.is_some());
        assert!(timeout.is_stopped());
        assert!(registry.get("r1").await.is_none());

        // Double remove tolerated.
        assert!(registry.remove("r1").await.is_none());
    }
}
