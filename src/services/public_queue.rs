use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::services::connection::SafeConn;
use crate::services::timeout::Timeout;

/// A player waiting for a stranger match.
pub struct QueuedPlayer {
    pub user_id: String,
    pub username: String,
    pub conn: Arc<SafeConn>,
    pub joined_at: DateTime<Utc>,
    expiry: Arc<Timeout>,
}

impl QueuedPlayer {
    pub fn new(
        user_id: String,
        username: String,
        conn: Arc<SafeConn>,
        expiry: Arc<Timeout>,
    ) -> Self {
        QueuedPlayer {
            user_id,
            username,
            conn,
            joined_at: Utc::now(),
            expiry,
        }
    }

    pub fn expiry(&self) -> &Arc<Timeout> {
        &self.expiry
    }
}

/// Outcome of a public game request against the pool.
pub enum QueueOutcome {
    /// The requester was already waiting; nothing changed.
    AlreadyQueued,
    /// Nobody was waiting; the requester is now enrolled.
    Enrolled,
    /// The longest-waiting opponent was claimed for a match.
    Matched(Arc<QueuedPlayer>),
}

/// The public matchmaking pool. Selection is by longest wait; each entry
/// carries its own expiry timer.
pub struct PublicQueue {
    waiting: RwLock<HashMap<String, Arc<QueuedPlayer>>>,
}

impl PublicQueue {
    pub fn new() -> Self {
        PublicQueue {
            waiting: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.waiting.read().await.contains_key(username)
    }

    /// One atomic step of the match rule: a requester already waiting is a
    /// no-op; otherwise claim the opponent with the oldest `joined_at`, or
    /// enroll the requester if the pool is empty. The caller arms the
    /// requester's expiry only after an `Enrolled` outcome.
    pub async fn match_or_enroll(&self, player: Arc<QueuedPlayer>) -> QueueOutcome {
        let claimed = {
            let mut waiting = self.waiting.write().await;
            if waiting.contains_key(&player.username) {
                return QueueOutcome::AlreadyQueued;
            }

            let oldest = waiting
                .values()
                .min_by_key(|waiter| waiter.joined_at)
                .map(|waiter| waiter.username.clone());
            match oldest.and_then(|username| waiting.remove(&username)) {
                Some(opponent) => opponent,
                None => {
                    waiting.insert(player.username.clone(), player);
                    return QueueOutcome::Enrolled;
                }
            }
        };

        claimed.expiry.stop().await;
        QueueOutcome::Matched(claimed)
    }

    /// Remove one player, stopping their expiry. Returns the removed entry
    /// so callers can notify the departing socket.
    pub async fn remove(&self, username: &str) -> Option<Arc<QueuedPlayer>> {
        let player = self.waiting.write().await.remove(username);
        if let Some(player) = &player {
            player.expiry.stop().await;
        }
        player
    }

    pub async fn usernames(&self) -> HashSet<String> {
        self.waiting.read().await.keys().cloned().collect()
    }
}

impl Default for PublicQueue {
    fn default() -> Self {
        Self::new()
    }
}
