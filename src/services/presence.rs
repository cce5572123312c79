use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::services::connection::SafeConn;

/// Authoritative map of currently connected users, keyed by username.
///
/// This is only the socket directory; the online-users *view* (connected
/// minus in-room minus queued) is computed by the coordinator from
/// snapshots of this map and the registries.
pub struct PresenceDirectory {
    connections: RwLock<HashMap<String, Arc<SafeConn>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        PresenceDirectory {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, username: &str, conn: Arc<SafeConn>) {
        self.connections
            .write()
            .await
            .insert(username.to_string(), conn);
    }

    pub async fn remove(&self, username: &str) -> Option<Arc<SafeConn>> {
        self.connections.write().await.remove(username)
    }

    pub async fn get(&self, username: &str) -> Option<Arc<SafeConn>> {
        self.connections.read().await.get(username).cloned()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.connections.read().await.contains_key(username)
    }

    /// Clone out the whole directory for lock-free fan-out writes.
    pub async fn snapshot(&self) -> Vec<(String, Arc<SafeConn>)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(username, conn)| (username.clone(), Arc::clone(conn)))
            .collect()
    }
}

impl Default for PresenceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_get_remove() {
        let presence = PresenceDirectory::new();
        presence.add("alice", Arc::new(SafeConn::detached())).await;

        assert!(presence.contains("alice").await);
        assert!(presence.get("alice").await.is_some());

        assert!(presence.remove("alice").await.is_some());
        assert!(!presence.contains("alice").await);
        assert!(presence.remove("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_membership() {
        let presence = PresenceDirectory::new();
        presence.add("alice", Arc::new(SafeConn::detached())).await;
        presence.add("bob", Arc::new(SafeConn::detached())).await;

        let snapshot = presence.snapshot().await;
        let mut names: Vec<&str> = snapshot.iter().map(|(name, _)| name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
