use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::models::user::UserResponse;
use crate::services::errors::user_service_errors::UserServiceError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/create", post(create_user))
        .route("/users/get", get(get_user))
        .route("/users/disconnect", delete(disconnect_user))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
}

#[derive(Debug, Deserialize)]
struct UsernameQuery {
    username: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), (StatusCode, Json<serde_json::Value>)> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Username is required"})),
        ));
    }

    match state.user_service.create_user(username).await {
        Ok(user) => {
            info!("Created user {} with id {}", user.username, user.id);
            Ok((StatusCode::CREATED, Json(user.into())))
        }
        Err(UserServiceError::UserAlreadyExists) => Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "User already has an active session"})),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )),
    }
}

async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<UserResponse>, (StatusCode, Json<serde_json::Value>)> {
    let username = query.username.unwrap_or_default();
    match state.user_service.get_user(&username).await {
        Ok(user) => Ok(Json(user.into())),
        Err(e) => Err((StatusCode::NOT_FOUND, Json(json!({"error": e.to_string()})))),
    }
}

/// Close the user's socket (if any), clear their flags, delete the record
/// and announce the new roster.
async fn disconnect_user(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let username = query.username.unwrap_or_default();
    if username.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Username is required"})),
        ));
    }

    let user = state.user_service.get_user(&username).await.map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    state.coordinator.force_disconnect(&username).await;

    if let Err(e) = state.user_service.delete_user(&username).await {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Failed to delete user: {}", e)})),
        ));
    }

    info!("User {} disconnected and deleted", user.username);
    Ok(Json(json!({
        "message": format!("User {} successfully disconnected and deleted", user.username)
    })))
}
