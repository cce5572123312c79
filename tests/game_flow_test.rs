pub mod common;
use common::*;

use std::time::Duration;

use chess_lobby::Config;
use serde_json::json;

/// Moves are relayed verbatim to the opponent, and the clock's next
/// time_update reflects the flipped turn.
#[tokio::test]
async fn test_move_relay_and_turn_flip() {
    let server = TestServer::spawn(Config::default()).await;
    let client = http_client();

    let alice_id = server.create_user(&client, "alice").await;
    let bob_id = server.create_user(&client, "bob").await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;

    let room_id =
        start_private_game(&mut alice, &mut bob, &alice_id, "alice", &bob_id, "bob").await;

    let fen_after_e4 = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
    send_frame(
        &mut alice,
        "game_move",
        json!({
            "gameId": room_id,
            "fromUserId": alice_id,
            "toUserId": bob_id,
            "toUsername": "bob",
            "move": { "from": "e2", "to": "e4", "piece": "p" },
            "fen": fen_after_e4,
            "isWhitesTurn": false,
        }),
    )
    .await;

    // Bob receives the move content untouched.
    let relayed = recv_until(&mut bob, "game_move", Duration::from_secs(5)).await;
    assert_eq!(relayed["gameId"], room_id);
    assert_eq!(relayed["fen"], fen_after_e4);
    assert_eq!(relayed["move"]["from"], "e2");
    assert_eq!(relayed["isWhitesTurn"], false);

    // The clock confirms it is black's turn now.
    let update = recv_until(&mut bob, "time_update", Duration::from_secs(5)).await;
    assert_eq!(update["isWhitesTurn"], false);
    assert_eq!(update["roomId"], room_id);
}

/// A client-reported checkmate is forwarded to both sockets and the room is
/// torn down after the grace delay, returning both players to the roster.
#[tokio::test]
async fn test_checkmate_closes_room() {
    let config = Config {
        room_cleanup_delay: Duration::from_millis(200),
        ..Config::default()
    };
    let server = TestServer::spawn(config).await;
    let client = http_client();

    let alice_id = server.create_user(&client, "alice").await;
    let bob_id = server.create_user(&client, "bob").await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;

    let room_id =
        start_private_game(&mut alice, &mut bob, &alice_id, "alice", &bob_id, "bob").await;

    send_frame(
        &mut alice,
        "game_over_checkmate",
        json!({
            "gameId": room_id,
            "winner": "white",
            "reason": "checkmate",
            "winnerId": alice_id,
        }),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let game_over = recv_until(ws, "game_over_checkmate", Duration::from_secs(5)).await;
        assert_eq!(game_over["gameId"], room_id);
        assert_eq!(game_over["winner"], "white");
        assert_eq!(game_over["winnerId"], alice_id.as_str());
    }

    // After the cleanup delay both players are visible online again.
    let roster = recv_roster_until(&mut alice, Duration::from_secs(5), |names| {
        names.contains(&"alice".to_string()) && names.contains(&"bob".to_string())
    })
    .await;
    assert_eq!(roster.len(), 2);
}

/// Flag-fall with a one-second budget: white never moves, black wins on
/// time and both sockets get the terminal game_over.
#[tokio::test]
async fn test_flag_fall_ends_game() {
    let config = Config {
        game_clock: Duration::from_secs(1),
        ..Config::default()
    };
    let server = TestServer::spawn(config).await;
    let client = http_client();

    let alice_id = server.create_user(&client, "alice").await;
    let bob_id = server.create_user(&client, "bob").await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;

    let room_id =
        start_private_game(&mut alice, &mut bob, &alice_id, "alice", &bob_id, "bob").await;

    for ws in [&mut alice, &mut bob] {
        let game_over = recv_until(ws, "game_over", Duration::from_secs(6)).await;
        assert_eq!(game_over["gameId"], room_id);
        assert_eq!(game_over["winner"], "black");
        assert_eq!(game_over["reason"], "timeout");
        assert_eq!(game_over["winnerId"], bob_id.as_str());
        assert_eq!(game_over["isGameOver"], true);
        assert_eq!(game_over["status"], "finished");
        // The fallen side is at zero, the winner kept their full budget.
        assert_eq!(game_over["whiteTime"], "00:00");
        assert_eq!(game_over["blackTime"], "00:01");
    }

    // The room is gone: both players reappear in the roster.
    recv_roster_until(&mut alice, Duration::from_secs(5), |names| {
        names.contains(&"alice".to_string()) && names.contains(&"bob".to_string())
    })
    .await;
}

/// A player walks away via room_leave: the opponent gets room_closed and
/// both flags clear.
#[tokio::test]
async fn test_room_leave_notifies_opponent() {
    let server = TestServer::spawn(Config::default()).await;
    let client = http_client();

    let alice_id = server.create_user(&client, "alice").await;
    let bob_id = server.create_user(&client, "bob").await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;

    let room_id =
        start_private_game(&mut alice, &mut bob, &alice_id, "alice", &bob_id, "bob").await;

    send_frame(
        &mut alice,
        "room_leave",
        invitation_payload("room_leave", &alice_id, "alice", &bob_id, "bob", &room_id),
    )
    .await;

    let closed = recv_until(&mut bob, "room_closed", Duration::from_secs(5)).await;
    assert_eq!(closed["room_id"], room_id);
    assert_eq!(closed["fromUsername"], "alice");

    recv_roster_until(&mut bob, Duration::from_secs(5), |names| {
        names.contains(&"alice".to_string()) && names.contains(&"bob".to_string())
    })
    .await;
}

/// Abrupt disconnect during a live game: the opponent gets room_closed, the
/// room is reclaimed, and the dropped user leaves the roster.
#[tokio::test]
async fn test_disconnect_during_game_closes_room() {
    let server = TestServer::spawn(Config::default()).await;
    let client = http_client();

    let alice_id = server.create_user(&client, "alice").await;
    let bob_id = server.create_user(&client, "bob").await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;

    let room_id =
        start_private_game(&mut alice, &mut bob, &alice_id, "alice", &bob_id, "bob").await;

    drop(alice);

    let closed = recv_until(&mut bob, "room_closed", Duration::from_secs(5)).await;
    assert_eq!(closed["room_id"], room_id);
    assert_eq!(closed["fromUsername"], "alice");

    // Bob is back in the roster; alice's presence entry is gone.
    let roster = recv_roster_until(&mut bob, Duration::from_secs(5), |names| {
        names.contains(&"bob".to_string())
    })
    .await;
    assert!(!roster.contains(&"alice".to_string()));

    // The record survives the disconnect, only the flags clear.
    let fetched = client
        .get(format!("{}/users/get?username=alice", server.base_url()))
        .send()
        .await
        .expect("Failed to send get request");
    assert_eq!(fetched.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = fetched.json().await.expect("Invalid get response");
    assert_eq!(body["isOnline"], false);
    assert_eq!(body["isInRoom"], false);
}
