//! Shared helpers for the end-to-end suites: an in-process server on an
//! ephemeral port plus thin HTTP/WebSocket client utilities.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chess_lobby::{app, AppState, Config};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
}

impl TestServer {
    /// Boot the full application against a fresh temp user store.
    pub async fn spawn(config: Config) -> Self {
        let users_dir =
            std::env::temp_dir().join(format!("chess-lobby-e2e-{}", uuid::Uuid::new_v4()));
        let state = AppState::initialize(users_dir, config).await;
        let router = app(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");

        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Test server crashed");
        });

        TestServer { addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, username: &str) -> String {
        format!("ws://{}/ws?username={}", self.addr, username)
    }

    /// `POST /users/create`, asserting 201, returning the assigned user id.
    pub async fn create_user(&self, client: &reqwest::Client, username: &str) -> String {
        let response = client
            .post(format!("{}/users/create", self.base_url()))
            .json(&json!({ "username": username }))
            .send()
            .await
            .expect("Failed to send create request");
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Expected 201 Created for user {}",
            username
        );

        let body: Value = response.json().await.expect("Invalid create response");
        body["id"]
            .as_str()
            .expect("Missing id in create response")
            .to_string()
    }

    /// Open a websocket session for an already-registered username.
    pub async fn connect(&self, username: &str) -> WsClient {
        let (ws, _response) = connect_async(self.ws_url(username))
            .await
            .expect("Failed to connect to WebSocket");
        ws
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Send one `{type, content}` frame with the content encoded as a string.
pub async fn send_frame(ws: &mut WsClient, kind: &str, content: Value) {
    let envelope = json!({ "type": kind, "content": content.to_string() });
    ws.send(Message::Text(envelope.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Read frames until one of the wanted type arrives, returning its decoded
/// content. Unrelated frames (roster updates, clock ticks) are skipped.
pub async fn recv_until(ws: &mut WsClient, kind: &str, wait: Duration) -> Value {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let frame = tokio::time::timeout(remaining, ws.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {} frame", kind))
            .unwrap_or_else(|| panic!("Connection closed while waiting for {}", kind))
            .expect("WebSocket error");

        if let Message::Text(text) = frame {
            let envelope: Value = serde_json::from_str(&text).expect("Invalid envelope");
            if envelope["type"] == kind {
                let content = envelope["content"].as_str().unwrap_or_default();
                if content.is_empty() {
                    return Value::Null;
                }
                return serde_json::from_str(content).expect("Invalid content");
            }
        }
    }
}

/// Assert that no frame of the given type arrives within the window.
pub async fn assert_no_frame(ws: &mut WsClient, kind: &str, within: Duration) {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(frame)) => {
                if let Message::Text(text) = frame.expect("WebSocket error") {
                    let envelope: Value = serde_json::from_str(&text).expect("Invalid envelope");
                    assert_ne!(
                        envelope["type"], kind,
                        "Unexpected {} frame: {}",
                        kind, text
                    );
                }
            }
        }
    }
}

/// Read `online_users` broadcasts until one satisfies the predicate,
/// returning the usernames it carried.
pub async fn recv_roster_until(
    ws: &mut WsClient,
    wait: Duration,
    predicate: impl Fn(&[String]) -> bool,
) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        assert!(
            !remaining.is_zero(),
            "Timed out waiting for a matching online_users broadcast"
        );
        let roster = recv_until(ws, "online_users", remaining).await;
        let names: Vec<String> = roster
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|user| user["username"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if predicate(&names) {
            return names;
        }
    }
}

/// Standard invitation payload, inviter -> invitee.
pub fn invitation_payload(
    kind: &str,
    from_id: &str,
    from_name: &str,
    to_id: &str,
    to_name: &str,
    room_id: &str,
) -> Value {
    let mut payload = json!({
        "type": kind,
        "from_user_id": from_id,
        "from_username": from_name,
        "to_user_id": to_id,
        "to_username": to_name,
    });
    if !room_id.is_empty() {
        payload["room_id"] = Value::String(room_id.to_string());
    }
    payload
}

/// Drive the private invitation flow to a started game. Returns the room id.
pub async fn start_private_game(
    inviter: &mut WsClient,
    invitee: &mut WsClient,
    inviter_id: &str,
    inviter_name: &str,
    invitee_id: &str,
    invitee_name: &str,
) -> String {
    send_frame(
        inviter,
        "invitation_send",
        invitation_payload(
            "invitation_send",
            inviter_id,
            inviter_name,
            invitee_id,
            invitee_name,
            "",
        ),
    )
    .await;

    let received = recv_until(invitee, "invitation", Duration::from_secs(5)).await;
    let room_id = received["room_id"]
        .as_str()
        .expect("Invitation without room_id")
        .to_string();

    send_frame(
        invitee,
        "invitation_accept",
        invitation_payload(
            "invitation_accept",
            inviter_id,
            inviter_name,
            invitee_id,
            invitee_name,
            &room_id,
        ),
    )
    .await;

    let inviter_start = recv_until(inviter, "game_start", Duration::from_secs(5)).await;
    assert_eq!(inviter_start["gameId"], room_id);
    let invitee_start = recv_until(invitee, "game_start", Duration::from_secs(5)).await;
    assert_eq!(invitee_start["gameId"], room_id);

    room_id
}
