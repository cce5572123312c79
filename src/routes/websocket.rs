use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::messages::{
    GameOverMessage, InvitationMessage, LeaveRoomRequest, MoveMessage, WsEnvelope,
};
use crate::services::connection::SafeConn;
use crate::services::coordinator::SessionCoordinator;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    username: Option<String>,
}

/// `GET /ws?username=<U>`: 400 without a username, 401 for an unknown one,
/// otherwise upgrade and hand the socket to a session task.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(username) = query.username.filter(|name| !name.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Username is required").into_response();
    };

    if state.user_service.get_user(&username).await.is_err() {
        return (StatusCode::UNAUTHORIZED, "User not found").into_response();
    }

    ws.on_upgrade(move |socket| handle_session(socket, state, username))
        .into_response()
}

/// One task per socket: register presence, run the read loop, then run the
/// deferred cleanup whatever way the loop ended.
async fn handle_session(socket: WebSocket, state: AppState, username: String) {
    let (sink, mut stream) = socket.split();
    let conn = Arc::new(SafeConn::new(sink));

    let coordinator = Arc::clone(&state.coordinator);
    coordinator
        .register_session(&username, Arc::clone(&conn))
        .await;
    info!("User {} connected", username);

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!("WebSocket read error for {}: {}", username, e);
                break;
            }
        };

        match message {
            Message::Text(text) => dispatch(&coordinator, &username, &conn, &text).await,
            Message::Close(_) => {
                info!("User {} requested close", username);
                break;
            }
            _ => {}
        }
    }

    coordinator.cleanup_session(&username).await;
    info!("User {} disconnected", username);
}

/// Decode one envelope and route it. A malformed frame is logged and
/// dropped; the loop continues.
async fn dispatch(
    coordinator: &Arc<SessionCoordinator>,
    username: &str,
    conn: &Arc<SafeConn>,
    text: &str,
) {
    let envelope: WsEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Malformed frame from {}: {}", username, e);
            return;
        }
    };

    match envelope.kind.as_str() {
        "request_online_users" => {
            coordinator.send_online_users(conn).await;
        }

        "invitation_send" | "invitation_accept" | "invitation_reject" | "invitation_cancel"
        | "room_leave" => {
            let invitation: InvitationMessage = match serde_json::from_str(&envelope.content) {
                Ok(invitation) => invitation,
                Err(e) => {
                    warn!("Error parsing invitation from {}: {}", username, e);
                    return;
                }
            };
            if let Err(e) = coordinator.handle_invitation(username, invitation).await {
                warn!("Failed to process invitation: {}", e);
            }
            coordinator.broadcast_online_users().await;
        }

        "leave_room" => {
            let request: LeaveRoomRequest = match serde_json::from_str(&envelope.content) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Error parsing leave room request from {}: {}", username, e);
                    return;
                }
            };
            if let Err(e) = coordinator.handle_leave_room(&request.username).await {
                warn!("Error removing user from room: {}", e);
            }
            coordinator.broadcast_online_users().await;
        }

        "game_move" => {
            let move_message: MoveMessage = match serde_json::from_str(&envelope.content) {
                Ok(move_message) => move_message,
                Err(e) => {
                    warn!("Error parsing move data from {}: {}", username, e);
                    return;
                }
            };
            coordinator
                .handle_game_move(&envelope.content, move_message)
                .await;
        }

        "game_over_checkmate" => {
            let game_over: GameOverMessage = match serde_json::from_str(&envelope.content) {
                Ok(game_over) => game_over,
                Err(e) => {
                    warn!("Error parsing game over data from {}: {}", username, e);
                    return;
                }
            };
            coordinator
                .handle_game_over_checkmate(&envelope.content, game_over)
                .await;
        }

        "public_game_request" => {
            coordinator
                .handle_public_game_request(username, Arc::clone(conn))
                .await;
        }

        "public_queue_leave" => {
            coordinator.handle_public_queue_leave(username).await;
        }

        other => {
            warn!("Unhandled message type: {}", other);
            coordinator.broadcast_online_users().await;
        }
    }
}
