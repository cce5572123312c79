use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::repositories::user_repository::JsonFileUserRepository;
use crate::services::coordinator::SessionCoordinator;
use crate::services::user_service::UserService;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl AppState {
    /// Wire up the user store, user service and session coordinator.
    ///
    /// `users_dir` is the directory holding `users.json`; a missing or
    /// corrupted store is reinitialized empty rather than failing startup.
    pub async fn initialize(users_dir: impl Into<PathBuf>, config: Config) -> Self {
        let repository = Arc::new(JsonFileUserRepository::new(users_dir));
        if let Err(e) = repository.load().await {
            warn!("Error loading user store: {}", e);
        }

        let user_service = Arc::new(UserService::new(repository));
        let coordinator = SessionCoordinator::new(Arc::clone(&user_service), config);

        AppState {
            user_service,
            coordinator,
        }
    }
}
