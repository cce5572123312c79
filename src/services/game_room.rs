use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::models::messages::{InvitationMessage, Move, WsEnvelope};
use crate::models::user::OnlineUser;
use crate::services::clock::{format_clock, GameClock};
use crate::services::connection::SafeConn;
use crate::services::coordinator::SessionCoordinator;

/// Starting position of every game.
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Pending,
    InGame,
    Finished,
}

/// Mutable game state behind the room's lock.
#[derive(Debug, Clone)]
pub struct GameState {
    pub status: RoomStatus,
    pub position_fen: String,
    pub is_whites_turn: bool,
    pub is_game_over: bool,
    pub winner_id: String,
    pub whites_time: String,
    pub blacks_time: String,
    pub moves: Vec<Move>,
}

/// A live game session: both players, their connections, the shared game
/// state and the countdown clock.
pub struct GameRoom {
    pub room_id: String,
    pub white_player: OnlineUser,
    pub black_player: OnlineUser,
    pub game_creator_uid: String,
    pub created_at: DateTime<Utc>,
    state: RwLock<GameState>,
    connections: RwLock<HashMap<String, Arc<SafeConn>>>,
    clock: Mutex<Option<Arc<GameClock>>>,
}

impl GameRoom {
    fn new(invitation: &InvitationMessage, budget: Duration) -> Self {
        let initial = format_clock(budget.as_secs());
        GameRoom {
            room_id: invitation.room_id.clone(),
            white_player: OnlineUser {
                id: invitation.from_user_id.clone(),
                username: invitation.from_username.clone(),
                is_in_room: true,
            },
            black_player: OnlineUser {
                id: invitation.to_user_id.clone(),
                username: invitation.to_username.clone(),
                is_in_room: true,
            },
            game_creator_uid: invitation.from_user_id.clone(),
            created_at: Utc::now(),
            state: RwLock::new(GameState {
                status: RoomStatus::Pending,
                position_fen: INITIAL_FEN.to_string(),
                is_whites_turn: true,
                is_game_over: false,
                winner_id: String::new(),
                whites_time: initial.clone(),
                blacks_time: initial,
                moves: Vec::new(),
            }),
            connections: RwLock::new(HashMap::new()),
            clock: Mutex::new(None),
        }
    }

    pub fn contains_player(&self, username: &str) -> bool {
        self.white_player.username == username || self.black_player.username == username
    }

    /// The opponent of `username`, if they are a player of this room.
    pub fn other_player(&self, username: &str) -> Option<&OnlineUser> {
        if self.white_player.username == username {
            Some(&self.black_player)
        } else if self.black_player.username == username {
            Some(&self.white_player)
        } else {
            None
        }
    }

    pub async fn add_connection(&self, username: &str, conn: Arc<SafeConn>) {
        self.connections
            .write()
            .await
            .insert(username.to_string(), conn);
    }

    pub async fn remove_connection(&self, username: &str) {
        self.connections.write().await.remove(username);
    }

    pub async fn connection(&self, username: &str) -> Option<Arc<SafeConn>> {
        self.connections.read().await.get(username).cloned()
    }

    /// Send a frame to every attached connection.
    ///
    /// The connection map is snapshotted and the lock released before any
    /// write; a recipient whose write fails is gone and gets evicted.
    pub async fn broadcast(&self, message: &WsEnvelope) {
        let connections: Vec<(String, Arc<SafeConn>)> = {
            let guard = self.connections.read().await;
            guard
                .iter()
                .map(|(username, conn)| (username.clone(), Arc::clone(conn)))
                .collect()
        };

        for (username, conn) in connections {
            if let Err(e) = conn.write_json(message).await {
                error!(
                    "Error broadcasting message to {} in room {}: {}",
                    username, self.room_id, e
                );
                self.connections.write().await.remove(&username);
            }
        }
    }

    pub async fn set_clock(&self, clock: Arc<GameClock>) {
        *self.clock.lock().await = Some(clock);
    }

    pub async fn clock(&self) -> Option<Arc<GameClock>> {
        self.clock.lock().await.clone()
    }

    pub async fn stop_clock(&self) {
        if let Some(clock) = self.clock.lock().await.clone() {
            clock.stop().await;
        }
    }

    pub async fn game_state(&self) -> GameState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> RoomStatus {
        self.state.read().await.status
    }

    /// Both connections are attached and `game_start` is out.
    pub async fn set_in_game(&self) {
        let mut state = self.state.write().await;
        if state.status == RoomStatus::Pending {
            state.status = RoomStatus::InGame;
        }
    }

    /// Record a relayed move: trusted FEN, turn flag, move history.
    pub async fn apply_move(&self, fen: String, is_whites_turn: bool, played: Option<Move>) {
        let mut state = self.state.write().await;
        state.position_fen = fen;
        state.is_whites_turn = is_whites_turn;
        if let Some(mv) = played {
            state.moves.push(mv);
        }
    }

    /// Terminal transition; safe to call more than once.
    pub async fn finish(&self, winner_id: &str) {
        let mut state = self.state.write().await;
        state.is_game_over = true;
        state.status = RoomStatus::Finished;
        if state.winner_id.is_empty() {
            state.winner_id = winner_id.to_string();
        }
    }

    pub async fn set_times(&self, whites_time: String, blacks_time: String) {
        let mut state = self.state.write().await;
        state.whites_time = whites_time;
        state.blacks_time = blacks_time;
    }
}

/// Registry of live rooms. Creating a room constructs and starts its clock;
/// removing it stops the clock.
pub struct GameRoomRegistry {
    rooms: RwLock<HashMap<String, Arc<GameRoom>>>,
}

impl GameRoomRegistry {
    pub fn new() -> Self {
        GameRoomRegistry {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(
        &self,
        invitation: &InvitationMessage,
        coordinator: Weak<SessionCoordinator>,
        budget: Duration,
    ) -> Arc<GameRoom> {
        let room = Arc::new(GameRoom::new(invitation, budget));
        let clock = Arc::new(GameClock::new(
            room.room_id.clone(),
            Arc::downgrade(&room),
            coordinator,
            budget,
        ));
        room.set_clock(Arc::clone(&clock)).await;
        clock.start().await;

        self.rooms
            .write()
            .await
            .insert(room.room_id.clone(), Arc::clone(&room));
        info!(
            "Created game room {} for {} vs {}",
            room.room_id, room.white_player.username, room.black_player.username
        );
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<GameRoom>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Drop the room and stop its clock. Removing an absent room is a no-op.
    pub async fn remove(&self, room_id: &str) -> Option<Arc<GameRoom>> {
        let room = self.rooms.write().await.remove(room_id);
        if let Some(room) = &room {
            room.stop_clock().await;
        }
        room
    }

    /// Rooms that are pending or being played.
    pub async fn active_rooms(&self) -> Vec<Arc<GameRoom>> {
        let rooms: Vec<Arc<GameRoom>> = self.rooms.read().await.values().cloned().collect();
        let mut active = Vec::with_capacity(rooms.len());
        for room in rooms {
            let status = room.status().await;
            if status == RoomStatus::Pending || status == RoomStatus::InGame {
                active.push(room);
            }
        }
        active
    }

    pub async fn find_by_username(&self, username: &str) -> Option<Arc<GameRoom>> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .find(|room| room.contains_player(username))
            .cloned()
    }
}

impl Default for GameRoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::messages::InvitationKind;

    fn invitation(room_id: &str) -> InvitationMessage {
        InvitationMessage {
            kind: InvitationKind::InvitationAccept,
            from_user_id: "id-alice".to_string(),
            from_username: "alice".to_string(),
            to_user_id: "id-bob".to_string(),
            to_username: "bob".to_string(),
            room_id: room_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_initializes_room_and_clock() {
        let registry = GameRoomRegistry::new();
        let room = registry
            .create(&invitation("r1"), Weak::new(), Duration::from_secs(600))
            .await;

        assert_eq!(room.white_player.username, "alice");
        assert_eq!(room.black_player.username, "bob");
        assert_eq!(room.game_creator_uid, "id-alice");

        let state = room.game_state().await;
        assert_eq!(state.status, RoomStatus::Pending);
        assert_eq!(state.position_fen, INITIAL_FEN);
        assert!(state.is_whites_turn);
        assert!(!state.is_game_over);
        assert_eq!(state.whites_time, "10:00");
        assert!(state.moves.is_empty());

        let clock = room.clock().await.expect("clock must be running");
        assert_eq!(clock.seconds().await, (600, 600));

        registry.remove("r1").await;
    }

    #[tokio::test]
    async fn test_remove_stops_clock_and_forgets_room() {
        let registry = GameRoomRegistry::new();
        let room = registry
            .create(&invitation("r1"), Weak::new(), Duration::from_secs(600))
            .await;

        let removed = registry.remove("r1").await.expect("room existed");
        assert_eq!(removed.room_id, room.room_id);
        assert!(registry.get("r1").await.is_none());

        // Removing again is a no-op.
        assert!(registry.remove("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_active_rooms_excludes_finished() {
        let registry = GameRoomRegistry::new();
        let room = registry
            .create(&invitation("r1"), Weak::new(), Duration::from_secs(600))
            .await;
        registry
            .create(&invitation("r2"), Weak::new(), Duration::from_secs(600))
            .await;

        assert_eq!(registry.active_rooms().await.len(), 2);

        room.finish("id-bob").await;
        let active = registry.active_rooms().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].room_id, "r2");

        registry.remove("r1").await;
        registry.remove("r2").await;
    }

    #[tokio::test]
    async fn test_other_player_lookup() {
        let registry = GameRoomRegistry::new();
        let room = registry
            .create(&invitation("r1"), Weak::new(), Duration::from_secs(600))
            .await;

        assert_eq!(room.other_player("alice").unwrap().username, "bob");
        assert_eq!(room.other_player("bob").unwrap().username, "alice");
        assert!(room.other_player("carol").is_none());

        assert!(registry.find_by_username("bob").await.is_some());
        assert!(registry.find_by_username("carol").await.is_none());

        registry.remove("r1").await;
    }

    #[tokio::test]
    async fn test_finish_keeps_first_winner() {
        let registry = GameRoomRegistry::new();
        let room = registry
            .create(&invitation("r1"), Weak::new(), Duration::from_secs(600))
            .await;

        room.finish("id-bob").await;
        room.finish("id-alice").await;

        let state = room.game_state().await;
        assert!(state.is_game_over);
        assert_eq!(state.status, RoomStatus::Finished);
        assert_eq!(state.winner_id, "id-bob");

        registry.remove("r1").await;
    }
}
