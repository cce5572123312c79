use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::models::user::UserProfile;
use crate::repositories::errors::user_repository_errors::UserRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Durable `username -> profile` directory consumed by the core.
///
/// In-memory state is authoritative: implementations apply the mutation
/// first and treat a failed persistence write as a logged warning, not an
/// error (the server keeps serving from memory until restart).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &UserProfile) -> Result<(), UserRepositoryError>;
    async fn get_user(&self, username: &str) -> Result<UserProfile, UserRepositoryError>;
    async fn delete_user(&self, username: &str) -> Result<(), UserRepositoryError>;
    async fn update_online_status(
        &self,
        username: &str,
        is_online: bool,
        is_in_room: bool,
    ) -> Result<(), UserRepositoryError>;
    async fn update_room_status(
        &self,
        username: &str,
        is_in_room: bool,
    ) -> Result<(), UserRepositoryError>;
}

/// On-disk document shape: `{"users": {username: profile}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct UserStoreFile {
    users: HashMap<String, UserProfile>,
}

/// File-backed repository persisting to `<dir>/users.json`, written through
/// on every mutation with four-space indentation.
pub struct JsonFileUserRepository {
    dir: PathBuf,
    users: RwLock<HashMap<String, UserProfile>>,
}

impl JsonFileUserRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileUserRepository {
            dir: dir.into(),
            users: RwLock::new(HashMap::new()),
        }
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join("users.json")
    }

    /// Load the store from disk, creating the directory and an empty file on
    /// first run. A corrupted file is logged and reinitialized empty.
    pub async fn load(&self) -> Result<(), UserRepositoryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UserRepositoryError::Io(format!("failed to create users dir: {}", e)))?;

        let path = self.file_path();
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.save().await;
                return Ok(());
            }
            Err(e) => {
                return Err(UserRepositoryError::Io(format!(
                    "failed to read users file: {}",
                    e
                )))
            }
        };

        if data.is_empty() {
            self.save().await;
            return Ok(());
        }

        match serde_json::from_slice::<UserStoreFile>(&data) {
            Ok(store) => {
                *self.users.write().await = store.users;
            }
            Err(e) => {
                warn!("corrupted users.json file, creating new one: {}", e);
                self.users.write().await.clear();
                self.save().await;
            }
        }
        Ok(())
    }

    /// Write the current map through to disk. Failures are logged and
    /// swallowed; the in-memory map stays authoritative.
    async fn save(&self) {
        let store = UserStoreFile {
            users: self.users.read().await.clone(),
        };

        // The on-disk contract is four-space indentation.
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if let Err(e) = store.serialize(&mut ser) {
            warn!("failed to marshal users: {}", e);
            return;
        }

        if let Err(e) = tokio::fs::write(self.file_path(), buf).await {
            warn!("failed to write users file: {}", e);
        }
    }
}

#[async_trait]
impl UserRepository for JsonFileUserRepository {
    async fn create_user(&self, user: &UserProfile) -> Result<(), UserRepositoryError> {
        {
            let mut users = self.users.write().await;
            if users.contains_key(&user.username) {
                return Err(UserRepositoryError::AlreadyExists);
            }
            users.insert(user.username.clone(), user.clone());
        }
        self.save().await;
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<UserProfile, UserRepositoryError> {
        self.users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or(UserRepositoryError::NotFound)
    }

    async fn delete_user(&self, username: &str) -> Result<(), UserRepositoryError> {
        {
            let mut users = self.users.write().await;
            if users.remove(username).is_none() {
                return Err(UserRepositoryError::NotFound);
            }
        }
        self.save().await;
        Ok(())
    }

    async fn update_online_status(
        &self,
        username: &str,
        is_online: bool,
        is_in_room: bool,
    ) -> Result<(), UserRepositoryError> {
        {
            let mut users = self.users.write().await;
            let user = users.get_mut(username).ok_or(UserRepositoryError::NotFound)?;
            user.is_online = is_online;
            user.is_in_room = is_in_room;
        }
        self.save().await;
        Ok(())
    }

    async fn update_room_status(
        &self,
        username: &str,
        is_in_room: bool,
    ) -> Result<(), UserRepositoryError> {
        {
            let mut users = self.users.write().await;
            let user = users.get_mut(username).ok_or(UserRepositoryError::NotFound)?;
            user.is_in_room = is_in_room;
        }
        self.save().await;
        Ok(())
    }
}
