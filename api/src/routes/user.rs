//! Profile endpoints (/users/me*)

use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::media::store_uploaded_image;
use crate::AppState;
use crate::domain::users::{User, UserUpdate};
use crate::services::cookies;
use crate::services::error::ApiError;
use crate::store::{TokenStore, UserStore};

/// User API response DTO
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    // no password hash or google id
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            email_verified: u.email_verified,
            avatar_url: u.avatar_url,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/users/me/avatar", post(upload_avatar))
        .route("/users/me/permissions", get(get_permissions))
}

/// A valid token for a deleted user is still unauthorized
async fn current_user(state: &AppState, user_id: i64) -> Result<User, ApiError> {
    state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)
}

/// GET /users/me
async fn get_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(current_user(&state, user_id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct UpdateMeRequest {
    name: Option<String>,
}

impl UpdateMeRequest {
    fn validate(self) -> Result<UserUpdate, ApiError> {
        let name = match self.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() || name.chars().count() > 100 {
                    return Err(ApiError::bad_request("Name must be 1-100 characters"));
                }
                Some(name)
            }
            None => None,
        };
        Ok(UserUpdate {
            name,
            avatar_url: None,
        })
    }
}

/// PATCH /users/me
async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let update = req.validate()?;
    let user = state
        .store
        .update_user(user_id, update)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    Ok(Json(user.into()))
}

/// DELETE /users/me - Delete the account with its walls, and end the session
async fn delete_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError> {
    state.store.revoke_user_refresh_tokens(user_id).await?;
    if !state.store.delete_user(user_id).await? {
        return Err(ApiError::unauthorized());
    }
    tracing::info!(user_id, "account deleted");

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_access_cookie());
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_refresh_cookie());
    Ok(response)
}

/// POST /users/me/avatar - multipart `file`
async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    current_user(&state, user_id).await?;
    let url = store_uploaded_image(&state, &mut multipart, "avatars", "user", user_id).await?;

    let user = state
        .store
        .update_user(
            user_id,
            UserUpdate {
                name: None,
                avatar_url: Some(url),
            },
        )
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    Ok(Json(user.into()))
}

#[derive(Serialize)]
struct PermissionsResponse {
    role: String,
    permissions: Vec<String>,
}

/// GET /users/me/permissions - Global role and what it grants
async fn get_permissions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let user = current_user(&state, user_id).await?;
    let permissions = state
        .store
        .role(&user.role)
        .await?
        .map(|r| r.permissions)
        .unwrap_or_default();

    Ok(Json(PermissionsResponse {
        role: user.role,
        permissions,
    }))
}
