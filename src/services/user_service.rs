use std::sync::Arc;

use crate::models::user::UserProfile;
use crate::repositories::errors::user_repository_errors::UserRepositoryError;
use crate::repositories::user_repository::UserRepository;
use crate::services::errors::user_service_errors::UserServiceError;

pub struct UserService {
    repository: Arc<dyn UserRepository + Send + Sync>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository + Send + Sync>) -> Self {
        UserService { repository }
    }

    /// Register a new username. Strictly create-only: an existing record is
    /// reported as a conflict and left untouched.
    pub async fn create_user(&self, username: &str) -> Result<UserProfile, UserServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }

        let user = UserProfile::new(username);
        self.repository
            .create_user(&user)
            .await
            .map_err(|e| match e {
                UserRepositoryError::AlreadyExists => UserServiceError::UserAlreadyExists,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })?;
        Ok(user)
    }

    pub async fn get_user(&self, username: &str) -> Result<UserProfile, UserServiceError> {
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        self.repository.get_user(username).await.map_err(|e| match e {
            UserRepositoryError::NotFound => UserServiceError::UserNotFound,
            _ => UserServiceError::RepositoryError(e.to_string()),
        })
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), UserServiceError> {
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        self.repository
            .delete_user(username)
            .await
            .map_err(|e| match e {
                UserRepositoryError::NotFound => UserServiceError::UserNotFound,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })
    }

    pub async fn update_online_status(
        &self,
        username: &str,
        is_online: bool,
        is_in_room: bool,
    ) -> Result<(), UserServiceError> {
        self.repository
            .update_online_status(username, is_online, is_in_room)
            .await
            .map_err(|e| match e {
                UserRepositoryError::NotFound => UserServiceError::UserNotFound,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })
    }

    pub async fn update_room_status(
        &self,
        username: &str,
        is_in_room: bool,
    ) -> Result<(), UserServiceError> {
        self.repository
            .update_room_status(username, is_in_room)
            .await
            .map_err(|e| match e {
                UserRepositoryError::NotFound => UserServiceError::UserNotFound,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })
    }
}
