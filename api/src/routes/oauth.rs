//! Google OAuth endpoints (/auth/google/*)

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use super::auth::{normalize_email, start_session};
use super::user::UserResponse;
use crate::AppState;
use crate::domain::users::{NewUser, User};
use crate::services::error::{ApiError, LogErr};
use crate::services::google::{GoogleClient, GoogleUser};
use crate::store::{Store, StoreError, TokenStore, UserStore};

pub fn routes() -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/auth/google", get(auth_google))
        .route("/auth/google/token", post(auth_google_token));

    // Stricter than the password endpoints: 5 request burst, then one every 12 seconds
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(12)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish();

    match rate_limit_config {
        Some(config) => router.layer(GovernorLayer {
            config: config.into(),
        }),
        None => {
            tracing::error!("invalid OAuth rate limit config, serving OAuth routes unlimited");
            router
        }
    }
}

fn google_client(state: &AppState) -> Result<&GoogleClient, ApiError> {
    state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Google sign-in is not configured".into()))
}

#[derive(Serialize)]
struct AuthUrlResponse {
    url: String,
}

/// GET /auth/google - Start the OAuth flow; returns the URL to send the user to
async fn auth_google(State(state): State<Arc<AppState>>) -> Result<Json<AuthUrlResponse>, ApiError> {
    let auth_request = google_client(&state)?.authorize_url();

    state
        .store
        .save_oauth_state(&auth_request.state, &auth_request.code_verifier)
        .await?;

    Ok(Json(AuthUrlResponse {
        url: auth_request.url,
    }))
}

#[derive(Deserialize)]
struct TokenRequest {
    code: String,
    state: String,
}

/// Find the account for a Google identity, linking or creating as needed
///
/// Lookup order: Google id, then verified email (linking the Google id to an
/// existing password account), then a new account.
async fn upsert_google_user(store: &dyn Store, info: &GoogleUser) -> Result<User, ApiError> {
    if let Some(user) = store.user_by_google_id(&info.sub).await? {
        return Ok(user);
    }

    let email = normalize_email(&info.email)
        .ok_or_else(|| ApiError::bad_request("Google account has no usable email"))?;

    if let Some(user) = store.user_by_email(&email).await? {
        if !info.email_verified {
            return Err(ApiError::Conflict(
                "An account with this email already exists".into(),
            ));
        }
        store.link_google_id(user.id, &info.sub).await?;
        if !user.email_verified {
            store.mark_email_verified(user.id).await?;
        }
        tracing::info!(user_id = user.id, "linked Google account");
        return store
            .user_by_id(user.id)
            .await?
            .ok_or_else(ApiError::internal);
    }

    let name = info
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let user = store
        .create_user(NewUser {
            email,
            name,
            password_hash: None,
            google_id: Some(info.sub.clone()),
            email_verified: info.email_verified,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Conflict("Account already exists".into()),
            e => e.into(),
        })?;
    tracing::info!(user_id = user.id, "user signed up with Google");
    Ok(user)
}

/// POST /auth/google/token - Exchange the OAuth code for a session
async fn auth_google_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Response, ApiError> {
    let google = google_client(&state)?;

    let code_verifier = state
        .store
        .take_oauth_state(&req.state)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired OAuth state"))?;

    let token = google
        .exchange_code(&req.code, &code_verifier)
        .await
        .log_as("Google token exchange failed", ApiError::Unauthorized("Google sign-in failed".into()))?;

    let info = google
        .user_info(&token.access_token)
        .await
        .log_500("Google userinfo failed")?;

    let user = upsert_google_user(state.store.as_ref(), &info).await?;
    let user_id = user.id;
    let response = Json(UserResponse::from(user)).into_response();
    start_session(&state, user_id, response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn google_user(sub: &str, email: &str, verified: bool) -> GoogleUser {
        GoogleUser {
            sub: sub.into(),
            email: email.into(),
            email_verified: verified,
            name: Some("G User".into()),
            picture: None,
        }
    }

    #[tokio::test]
    async fn test_creates_then_finds_by_google_id() {
        let store = MemoryStore::new();
        let created = upsert_google_user(&store, &google_user("g-1", "G@Example.com", true))
            .await
            .unwrap();
        assert_eq!(created.email, "g@example.com");
        assert!(created.email_verified);
        assert!(created.password_hash.is_none());

        let again = upsert_google_user(&store, &google_user("g-1", "other@example.com", true))
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_links_existing_password_account() {
        let store = MemoryStore::new();
        let existing = store
            .create_user(NewUser {
                email: "pw@example.com".into(),
                name: "Pw".into(),
                password_hash: Some("hash".into()),
                google_id: None,
                email_verified: false,
            })
            .await
            .unwrap();

        let linked = upsert_google_user(&store, &google_user("g-2", "pw@example.com", true))
            .await
            .unwrap();
        assert_eq!(linked.id, existing.id);
        assert_eq!(linked.google_id.as_deref(), Some("g-2"));
        assert!(linked.email_verified);
    }

    #[tokio::test]
    async fn test_unverified_google_email_does_not_take_over() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser {
                email: "pw@example.com".into(),
                name: "Pw".into(),
                password_hash: Some("hash".into()),
                google_id: None,
                email_verified: true,
            })
            .await
            .unwrap();

        let err = upsert_google_user(&store, &google_user("g-3", "pw@example.com", false))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
