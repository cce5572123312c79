use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::messages::{
    envelope, online_users_envelope, raw_envelope, GameOverBroadcast, GameOverMessage,
    GameStartState, InvitationKind, InvitationMessage, Move, MoveMessage, Notice, RoomClosed,
};
use crate::models::user::OnlineUser;
use crate::services::clock::format_clock;
use crate::services::connection::SafeConn;
use crate::services::errors::coordinator_errors::CoordinatorError;
use crate::services::game_room::{GameRoom, GameRoomRegistry, GameState, RoomStatus};
use crate::services::presence::PresenceDirectory;
use crate::services::public_queue::{PublicQueue, QueueOutcome, QueuedPlayer};
use crate::services::temp_room::TempRoomRegistry;
use crate::services::timeout::Timeout;
use crate::services::user_service::UserService;

/// Orchestrates the invitation and matchmaking state machines across the
/// presence directory, the two room registries and the public queue.
///
/// Every inbound frame lands here via the dispatcher; timers (invitation
/// timeouts, queue expiries, game clocks) call back in through a weak
/// self-handle, so the coordinator owns the registries and nothing owns the
/// coordinator but the application state.
pub struct SessionCoordinator {
    presence: PresenceDirectory,
    temp_rooms: TempRoomRegistry,
    rooms: GameRoomRegistry,
    queue: PublicQueue,
    users: Arc<UserService>,
    config: Config,
    self_ref: Weak<SessionCoordinator>,
}

impl SessionCoordinator {
    pub fn new(users: Arc<UserService>, config: Config) -> Arc<Self> {
        Arc::new_cyclic(|weak| SessionCoordinator {
            presence: PresenceDirectory::new(),
            temp_rooms: TempRoomRegistry::new(),
            rooms: GameRoomRegistry::new(),
            queue: PublicQueue::new(),
            users,
            config,
            self_ref: weak.clone(),
        })
    }

    // ---- session lifecycle -------------------------------------------------

    /// A socket finished its upgrade: record it, mark the user online,
    /// announce the new roster.
    pub async fn register_session(&self, username: &str, conn: Arc<SafeConn>) {
        self.presence.add(username, conn).await;
        if let Err(e) = self.users.update_online_status(username, true, false).await {
            warn!("Failed to mark {} online: {}", username, e);
        }
        self.broadcast_online_users().await;
    }

    /// The read loop ended (peer gone or forced close): leave any live
    /// room as if the user had sent `room_leave`, reclaim the queue entry,
    /// drop presence, clear flags, announce.
    pub async fn cleanup_session(&self, username: &str) {
        if let Some(room) = self.rooms.find_by_username(username).await {
            let leave = InvitationMessage {
                kind: InvitationKind::RoomLeave,
                from_user_id: String::new(),
                from_username: username.to_string(),
                to_user_id: String::new(),
                to_username: String::new(),
                room_id: room.room_id.clone(),
            };
            if let Err(e) = self.handle_invitation(username, leave).await {
                warn!("Room cleanup after disconnect of {} failed: {}", username, e);
            }
        }

        // The queue entry and its expiry must not outlive the socket.
        self.queue.remove(username).await;

        self.presence.remove(username).await;
        if let Err(e) = self
            .users
            .update_online_status(username, false, false)
            .await
        {
            warn!("Failed to mark {} offline: {}", username, e);
        }
        self.broadcast_online_users().await;
    }

    /// HTTP-initiated disconnect: close the socket and clear flags now; the
    /// session's own read loop finishes the rest when the close lands.
    pub async fn force_disconnect(&self, username: &str) {
        if let Some(conn) = self.presence.remove(username).await {
            conn.close().await;
        }
        if let Err(e) = self
            .users
            .update_online_status(username, false, false)
            .await
        {
            warn!("Failed to mark {} offline: {}", username, e);
        }
        self.broadcast_online_users().await;
    }

    // ---- invitations -------------------------------------------------------

    /// Entry point for the whole invitation family. `session_username` is
    /// the authenticated owner of the socket the frame arrived on; payload
    /// orientation is never trusted over it.
    pub async fn handle_invitation(
        &self,
        session_username: &str,
        invitation: InvitationMessage,
    ) -> Result<(), CoordinatorError> {
        if invitation.kind == InvitationKind::RoomLeave {
            if !self.presence.contains(&invitation.from_username).await {
                return Err(CoordinatorError::UserNotOnline(
                    invitation.from_username.clone(),
                ));
            }
            return self.handle_room_leave(invitation).await;
        }

        let Some(from_conn) = self.presence.get(&invitation.from_username).await else {
            return Err(CoordinatorError::UserNotOnline(
                invitation.from_username.clone(),
            ));
        };
        let Some(to_conn) = self.presence.get(&invitation.to_username).await else {
            return Err(CoordinatorError::UserNotOnline(
                invitation.to_username.clone(),
            ));
        };

        match invitation.kind {
            InvitationKind::InvitationSend => {
                self.handle_invitation_send(invitation, &from_conn, &to_conn)
                    .await
            }
            InvitationKind::InvitationAccept => {
                self.handle_invitation_accept(session_username, invitation)
                    .await
            }
            InvitationKind::InvitationReject => {
                self.handle_invitation_reject(session_username, invitation)
                    .await
            }
            InvitationKind::InvitationCancel => {
                self.handle_invitation_cancel(session_username, invitation)
                    .await
            }
            InvitationKind::RoomLeave => Ok(()),
        }
    }

    async fn handle_invitation_send(
        &self,
        mut invitation: InvitationMessage,
        from_conn: &Arc<SafeConn>,
        to_conn: &Arc<SafeConn>,
    ) -> Result<(), CoordinatorError> {
        let invitee = invitation.to_username.clone();
        if self.rooms.find_by_username(&invitee).await.is_some() {
            self.send_error(from_conn, &format!("{} is already in a game", invitee))
                .await;
            return Err(CoordinatorError::InviteeUnavailable(invitee));
        }
        if self.queue.contains(&invitee).await {
            self.send_error(
                from_conn,
                &format!("{} is waiting for a public game", invitee),
            )
            .await;
            return Err(CoordinatorError::InviteeUnavailable(invitee));
        }

        invitation.room_id = Uuid::new_v4().to_string();

        let weak = self.self_ref.clone();
        let on_fire = invitation.clone();
        let timeout = Arc::new(Timeout::new(self.config.invitation_timeout, async move {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.handle_invitation_timeout(on_fire).await;
            }
        }));
        self.temp_rooms.create(&invitation, Arc::clone(&timeout)).await;
        timeout.start().await;

        info!(
            "Invitation {} sent from {} to {}",
            invitation.room_id, invitation.from_username, invitation.to_username
        );
        if let Err(e) = to_conn.write_json(&envelope("invitation", &invitation)).await {
            // The timeout will reclaim the pending room.
            error!("Error sending invitation: {}", e);
        }
        Ok(())
    }

    /// Fires once the invitation TTL elapses. If the temporary room is
    /// already gone some other path won the race and this is a no-op.
    async fn handle_invitation_timeout(&self, invitation: InvitationMessage) {
        if self.temp_rooms.get(&invitation.room_id).await.is_none() {
            return;
        }
        info!("Invitation {} timed out", invitation.room_id);

        let mut payload = invitation.clone();
        payload.kind = InvitationKind::InvitationCancel;
        let message = envelope("invitation_timeout", &payload);

        for username in [&invitation.from_username, &invitation.to_username] {
            if let Some(conn) = self.presence.get(username).await {
                if let Err(e) = conn.write_json(&message).await {
                    error!("Error sending invitation timeout to {}: {}", username, e);
                }
            }
        }

        self.temp_rooms.remove(&invitation.room_id).await;
    }

    async fn handle_invitation_accept(
        &self,
        session_username: &str,
        invitation: InvitationMessage,
    ) -> Result<(), CoordinatorError> {
        let Some(temp) = self.temp_rooms.get(&invitation.room_id).await else {
            return Err(CoordinatorError::RoomNotFound(invitation.room_id.clone()));
        };
        if temp.black_player.username != session_username {
            return Err(CoordinatorError::NotInvitee {
                room_id: invitation.room_id.clone(),
                username: session_username.to_string(),
            });
        }

        // Stops the invitation timeout; a timeout firing right now sees the
        // record gone and backs off.
        self.temp_rooms.remove(&invitation.room_id).await;

        // Build the room from the stored record, not the payload.
        let canonical = InvitationMessage {
            kind: InvitationKind::InvitationAccept,
            from_user_id: temp.white_player.id.clone(),
            from_username: temp.white_player.username.clone(),
            to_user_id: temp.black_player.id.clone(),
            to_username: temp.black_player.username.clone(),
            room_id: invitation.room_id.clone(),
        };

        let room = self
            .rooms
            .create(&canonical, self.self_ref.clone(), self.config.game_clock)
            .await;

        for player in [&room.white_player, &room.black_player] {
            if let Err(e) = self.users.update_room_status(&player.username, true).await {
                warn!("Failed to flag {} as in-room: {}", player.username, e);
            }
        }

        let white_conn = self.presence.get(&room.white_player.username).await;
        let black_conn = self.presence.get(&room.black_player.username).await;
        self.start_game(&room, white_conn, black_conn, None).await;
        Ok(())
    }

    async fn handle_invitation_reject(
        &self,
        session_username: &str,
        invitation: InvitationMessage,
    ) -> Result<(), CoordinatorError> {
        // A missing room means accept/cancel/timeout already resolved it.
        let Some(temp) = self.temp_rooms.remove(&invitation.room_id).await else {
            return Ok(());
        };

        let other = if temp.white_player.username == session_username {
            &temp.black_player
        } else {
            &temp.white_player
        };

        match self.presence.get(&other.username).await {
            Some(conn) => {
                if let Err(e) = conn
                    .write_json(&envelope("invitation_rejected", &invitation))
                    .await
                {
                    error!("Error sending rejection notification: {}", e);
                }
            }
            None => warn!("Cannot send rejection - target user not connected"),
        }
        Ok(())
    }

    async fn handle_invitation_cancel(
        &self,
        session_username: &str,
        invitation: InvitationMessage,
    ) -> Result<(), CoordinatorError> {
        let Some(temp) = self.temp_rooms.remove(&invitation.room_id).await else {
            return Ok(());
        };

        let other = if temp.white_player.username == session_username {
            &temp.black_player
        } else {
            &temp.white_player
        };

        if let Some(conn) = self.presence.get(&other.username).await {
            if let Err(e) = conn
                .write_json(&envelope("invitation_cancelled", &invitation))
                .await
            {
                error!("Error sending cancellation notification: {}", e);
            }
        }
        Ok(())
    }

    async fn handle_room_leave(
        &self,
        invitation: InvitationMessage,
    ) -> Result<(), CoordinatorError> {
        let Some(room) = self.rooms.get(&invitation.room_id).await else {
            return Err(CoordinatorError::RoomNotFound(invitation.room_id.clone()));
        };
        if !room.contains_player(&invitation.from_username) {
            return Err(CoordinatorError::NotInRoom(
                invitation.from_username.clone(),
            ));
        }

        info!(
            "Processing room leave for {} in {}",
            invitation.from_username, invitation.room_id
        );
        room.stop_clock().await;

        if let Some(other) = room.other_player(&invitation.from_username) {
            if let Some(conn) = self.presence.get(&other.username).await {
                let payload = RoomClosed {
                    room_id: invitation.room_id.clone(),
                    from_username: invitation.from_username.clone(),
                };
                if let Err(e) = conn.write_json(&envelope("room_closed", &payload)).await {
                    error!(
                        "Error sending room closure message to {}: {}",
                        other.username, e
                    );
                }
            }
        }

        self.rooms.remove(&invitation.room_id).await;
        for player in [&room.white_player, &room.black_player] {
            if let Err(e) = self.users.update_room_status(&player.username, false).await {
                warn!("Failed to clear in-room flag of {}: {}", player.username, e);
            }
        }
        Ok(())
    }

    // ---- game frames -------------------------------------------------------

    /// Relay a move: nudge the clock, record the trusted position, forward
    /// the original content to the opponent.
    pub async fn handle_game_move(&self, content: &str, move_message: MoveMessage) {
        let Some(room) = self.rooms.get(&move_message.game_id).await else {
            warn!("Room not found: {}", move_message.game_id);
            return;
        };

        let state = room.game_state().await;
        if state.status == RoomStatus::InGame && !state.is_game_over {
            if let Some(clock) = room.clock().await {
                clock.switch_turn().await;
            }
        }

        let played = serde_json::from_value::<Move>(move_message.played.clone()).ok();
        room.apply_move(move_message.fen.clone(), move_message.is_whites_turn, played)
            .await;

        match room.connection(&move_message.to_username).await {
            Some(conn) => {
                if let Err(e) = conn.write_json(&raw_envelope("game_move", content)).await {
                    error!("Error sending move to other player: {}", e);
                }
            }
            None => warn!(
                "Connection not found for player {}",
                move_message.to_username
            ),
        }
    }

    /// The client reported a decisive result; trust it, tell both sides,
    /// and tear the room down after the grace delay.
    pub async fn handle_game_over_checkmate(&self, content: &str, game_over: GameOverMessage) {
        let Some(room) = self.rooms.get(&game_over.game_id).await else {
            warn!("Room not found: {}", game_over.game_id);
            return;
        };

        room.finish(&game_over.winner_id).await;
        room.broadcast(&raw_envelope("game_over_checkmate", content)).await;
        room.stop_clock().await;

        let weak = self.self_ref.clone();
        let delay = self.config.room_cleanup_delay;
        let room_id = game_over.game_id.clone();
        let players = [
            room.white_player.username.clone(),
            room.black_player.username.clone(),
        ];
        tokio::spawn(async move {
            sleep(delay).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            coordinator.rooms.remove(&room_id).await;
            for username in &players {
                if let Err(e) = coordinator.users.update_room_status(username, false).await {
                    warn!("Failed to clear in-room flag of {}: {}", username, e);
                }
            }
            coordinator.broadcast_online_users().await;
        });
    }

    /// Called by a room's clock when the side to move runs out of time.
    pub(crate) async fn handle_flag_fall(
        &self,
        room_id: &str,
        winner: &str,
        white_seconds: u64,
        black_seconds: u64,
    ) {
        let Some(room) = self.rooms.get(room_id).await else {
            return;
        };

        let winner_id = if winner == "white" {
            room.white_player.id.clone()
        } else {
            room.black_player.id.clone()
        };
        room.finish(&winner_id).await;

        let payload = GameOverBroadcast {
            game_id: room_id.to_string(),
            winner: winner.to_string(),
            reason: "timeout".to_string(),
            white_time: format_clock(white_seconds),
            black_time: format_clock(black_seconds),
            winner_id,
            is_game_over: true,
            status: "finished".to_string(),
        };
        room.broadcast(&envelope("game_over", &payload)).await;

        self.rooms.remove(room_id).await;
        for player in [&room.white_player, &room.black_player] {
            if let Err(e) = self.users.update_room_status(&player.username, false).await {
                warn!("Failed to clear in-room flag of {}: {}", player.username, e);
            }
        }
        self.broadcast_online_users().await;
    }

    /// `leave_room` frame: drop out of the queue and out of the current
    /// room without the closure notification of `room_leave`.
    pub async fn handle_leave_room(&self, username: &str) -> Result<(), CoordinatorError> {
        self.handle_public_queue_leave(username).await;

        let Some(room) = self.rooms.find_by_username(username).await else {
            return Err(CoordinatorError::NotInRoom(username.to_string()));
        };

        self.rooms.remove(&room.room_id).await;
        for player in [&room.white_player, &room.black_player] {
            if let Err(e) = self.users.update_room_status(&player.username, false).await {
                warn!("Failed to clear in-room flag of {}: {}", player.username, e);
            }
        }
        Ok(())
    }

    // ---- public queue ------------------------------------------------------

    /// Pair the requester with the longest-waiting opponent, or enroll them
    /// with a personal expiry if nobody is waiting.
    pub async fn handle_public_game_request(&self, username: &str, conn: Arc<SafeConn>) {
        let user = match self.users.get_user(username).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Public game request from unknown user {}: {}", username, e);
                return;
            }
        };

        if user.is_in_room || self.rooms.find_by_username(username).await.is_some() {
            self.send_error(&conn, "You are already in a game").await;
            return;
        }

        let weak = self.self_ref.clone();
        let expires = username.to_string();
        let expiry = Arc::new(Timeout::new(self.config.queue_timeout, async move {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.handle_public_queue_timeout(&expires).await;
            }
        }));
        let player = Arc::new(QueuedPlayer::new(
            user.id.clone(),
            username.to_string(),
            Arc::clone(&conn),
            Arc::clone(&expiry),
        ));

        match self.queue.match_or_enroll(player).await {
            QueueOutcome::AlreadyQueued => {}
            QueueOutcome::Enrolled => {
                expiry.start().await;
                info!("{} joined the public queue", username);
                self.broadcast_online_users().await;
            }
            QueueOutcome::Matched(opponent) => {
                info!(
                    "Matching {} with {} from the public queue",
                    username, opponent.username
                );
                let invitation = InvitationMessage {
                    kind: InvitationKind::InvitationAccept,
                    from_user_id: opponent.user_id.clone(),
                    from_username: opponent.username.clone(),
                    to_user_id: user.id.clone(),
                    to_username: username.to_string(),
                    room_id: Uuid::new_v4().to_string(),
                };

                let room = self
                    .rooms
                    .create(&invitation, self.self_ref.clone(), self.config.game_clock)
                    .await;

                for name in [opponent.username.as_str(), username] {
                    if let Err(e) = self.users.update_room_status(name, true).await {
                        warn!("Failed to flag {} as in-room: {}", name, e);
                    }
                }

                self.start_game(
                    &room,
                    Some(Arc::clone(&opponent.conn)),
                    Some(conn),
                    Some(self.config.game_start_delay),
                )
                .await;
            }
        }
    }

    async fn handle_public_queue_timeout(&self, username: &str) {
        let Some(player) = self.queue.remove(username).await else {
            return;
        };
        info!("{} timed out of the public queue", username);
        let message = envelope(
            "public_game_timeout",
            &Notice {
                message: "No opponent found. Please try again.".to_string(),
            },
        );
        if let Err(e) = player.conn.write_json(&message).await {
            error!("Error sending queue timeout to {}: {}", username, e);
        }
        self.broadcast_online_users().await;
    }

    pub async fn handle_public_queue_leave(&self, username: &str) {
        let Some(player) = self.queue.remove(username).await else {
            return;
        };
        let message = envelope(
            "public_queue_leave",
            &Notice {
                message: "You have left the public queue.".to_string(),
            },
        );
        if let Err(e) = player.conn.write_json(&message).await {
            error!("Error notifying {} of queue leave: {}", username, e);
        }
        self.broadcast_online_users().await;
    }

    // ---- game start --------------------------------------------------------

    /// Attach the given connections and deliver personalized `game_start`
    /// frames, optionally after the UI-transition delay used for public
    /// matches. The room turns `InGame` once the frames are out.
    async fn start_game(
        &self,
        room: &Arc<GameRoom>,
        white_conn: Option<Arc<SafeConn>>,
        black_conn: Option<Arc<SafeConn>>,
        delay: Option<Duration>,
    ) {
        if let Some(conn) = &white_conn {
            room.add_connection(&room.white_player.username, Arc::clone(conn))
                .await;
        }
        if let Some(conn) = &black_conn {
            room.add_connection(&room.black_player.username, Arc::clone(conn))
                .await;
        }

        match delay {
            None => {
                Self::deliver_game_start(room, white_conn, black_conn).await;
                room.set_in_game().await;
            }
            Some(delay) => {
                let room = Arc::clone(room);
                let weak = self.self_ref.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    Self::deliver_game_start(&room, white_conn, black_conn).await;
                    room.set_in_game().await;
                    if let Some(coordinator) = weak.upgrade() {
                        coordinator.broadcast_online_users().await;
                    }
                });
            }
        }
    }

    async fn deliver_game_start(
        room: &Arc<GameRoom>,
        white_conn: Option<Arc<SafeConn>>,
        black_conn: Option<Arc<SafeConn>>,
    ) {
        let state = room.game_state().await;
        let white_state = personalized_game_start(
            room,
            &state,
            &room.white_player.id,
            &room.black_player.username,
        );
        let black_state = personalized_game_start(
            room,
            &state,
            &room.black_player.id,
            &room.white_player.username,
        );

        if let Some(conn) = white_conn {
            if let Err(e) = conn.write_json(&envelope("game_start", &white_state)).await {
                error!(
                    "Error sending game start to {}: {}",
                    room.white_player.username, e
                );
            }
        }
        if let Some(conn) = black_conn {
            if let Err(e) = conn.write_json(&envelope("game_start", &black_state)).await {
                error!(
                    "Error sending game start to {}: {}",
                    room.black_player.username, e
                );
            }
        }
    }

    // ---- roster ------------------------------------------------------------

    /// Connected users minus everyone playing or queued. Computed from
    /// snapshots of the three maps; no lock is held across another.
    pub async fn online_users_view(&self) -> Vec<OnlineUser> {
        let connected = self.presence.snapshot().await;

        let mut busy: HashSet<String> = HashSet::new();
        for room in self.rooms.active_rooms().await {
            busy.insert(room.white_player.username.clone());
            busy.insert(room.black_player.username.clone());
        }
        busy.extend(self.queue.usernames().await);

        let mut online = Vec::new();
        for (username, _) in connected {
            if busy.contains(&username) {
                continue;
            }
            if let Ok(user) = self.users.get_user(&username).await {
                online.push(OnlineUser {
                    id: user.id,
                    username: user.username,
                    is_in_room: false,
                });
            }
        }
        online.sort_by(|a, b| a.username.cmp(&b.username));
        online
    }

    pub async fn broadcast_online_users(&self) {
        let online = self.online_users_view().await;
        let message = online_users_envelope(&online);
        for (username, conn) in self.presence.snapshot().await {
            if let Err(e) = conn.write_json(&message).await {
                error!("Error broadcasting online users to {}: {}", username, e);
            }
        }
    }

    pub async fn send_online_users(&self, conn: &SafeConn) {
        let online = self.online_users_view().await;
        if let Err(e) = conn.write_json(&online_users_envelope(&online)).await {
            error!("Error sending online users: {}", e);
        }
    }

    async fn send_error(&self, conn: &SafeConn, message: &str) {
        let frame = envelope(
            "error",
            &Notice {
                message: message.to_string(),
            },
        );
        if let Err(e) = conn.write_json(&frame).await {
            error!("Error sending error frame: {}", e);
        }
    }
}

fn personalized_game_start(
    room: &GameRoom,
    state: &GameState,
    user_id: &str,
    opponent_username: &str,
) -> GameStartState {
    GameStartState {
        game_id: room.room_id.clone(),
        game_creator_uid: room.game_creator_uid.clone(),
        positon_fen: state.position_fen.clone(),
        winner_id: state.winner_id.clone(),
        whites_time: state.whites_time.clone(),
        blacks_time: state.blacks_time.clone(),
        is_whites_turn: state.is_whites_turn,
        is_game_over: state.is_game_over,
        moves: state.moves.clone(),
        user_id: user_id.to_string(),
        opponent_username: opponent_username.to_string(),
    }
}
