//! Authentication and session management endpoints (/auth/*)

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{
        StatusCode,
        header::{AUTHORIZATION, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use super::user::UserResponse;
use crate::AppState;
use crate::constants::{MIN_PASSWORD_LENGTH, RESET_PASSWORD_TOKEN_MINUTES, VERIFY_EMAIL_TOKEN_HOURS};
use crate::domain::tokens::TokenPurpose;
use crate::domain::users::{NewUser, User};
use crate::services::cookies::{self, config::REFRESH_TOKEN_NAME};
use crate::services::error::{ApiError, LogErr};
use crate::services::mailer::{self, Email, Mailer};
use crate::services::session::{self, REFRESH_TOKEN_EXPIRY_DAYS};
use crate::store::{StoreError, TokenStore, UserStore};

pub fn routes() -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
        .route("/auth/token", post(issue_api_token));

    // 10 request burst per IP, then one every 6 seconds
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish();

    match rate_limit_config {
        Some(config) => router.layer(GovernorLayer {
            config: config.into(),
        }),
        None => {
            tracing::error!("invalid auth rate limit config, serving auth routes unlimited");
            router
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Any authenticated caller: `Authorization: Bearer` API token or the
/// `access_token` session cookie
pub struct AuthUser(pub i64);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(header) = parts.headers.get(AUTHORIZATION) {
            let token = header
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(ApiError::unauthorized)?;
            let user_id = session::validate_token(token.trim(), &state.config.jwt_bearer_secret)
                .log_as("bearer token rejected", ApiError::unauthorized())?;
            return Ok(AuthUser(user_id));
        }

        let SessionUser(user_id) = SessionUser::from_request_parts(parts, state).await?;
        Ok(AuthUser(user_id))
    }
}

/// A browser session only; bearer tokens are not accepted
pub struct SessionUser(pub i64);

impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .log_500("cookie extraction error")?;

        let access_token = jar
            .get(cookies::config::ACCESS_TOKEN_NAME)
            .map(|c| c.value())
            .ok_or_else(ApiError::unauthorized)?;

        let user_id = session::validate_token(access_token, &state.config.jwt_cookie_secret)
            .log_as("session cookie rejected", ApiError::unauthorized())?;

        Ok(SessionUser(user_id))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Lowercase and sanity-check an email address
pub(crate) fn normalize_email(input: &str) -> Option<String> {
    let email = input.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(email)
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Issue a cookie session for `user_id` and attach its cookies to `response`
pub(crate) async fn start_session(
    state: &AppState,
    user_id: i64,
    mut response: Response,
) -> Result<Response, ApiError> {
    let access_token = session::create_access_token(user_id, &state.config.jwt_cookie_secret)
        .log_500("failed to create access token")?;

    let refresh_token = session::generate_token();
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);
    state
        .store
        .save_refresh_token(&refresh_token, user_id, expires_at)
        .await?;

    let settings = &state.config.cookies;
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_access_cookie(&access_token, settings)?);
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_refresh_cookie(&refresh_token, settings)?);
    Ok(response)
}

/// Create a fresh email token and mail its link. Mail failures are logged only.
async fn send_token_mail(
    state: &AppState,
    user: &User,
    purpose: TokenPurpose,
) -> Result<(), ApiError> {
    let token = session::generate_token();
    let ttl = match purpose {
        TokenPurpose::VerifyEmail => Duration::hours(VERIFY_EMAIL_TOKEN_HOURS),
        TokenPurpose::ResetPassword => Duration::minutes(RESET_PASSWORD_TOKEN_MINUTES),
    };
    state
        .store
        .save_email_token(&token, user.id, purpose, Utc::now() + ttl)
        .await?;

    let frontend = &state.config.frontend_url;
    let email: Email = match purpose {
        TokenPurpose::VerifyEmail => mailer::verification_email(&user.email, frontend, &token),
        TokenPurpose::ResetPassword => mailer::password_reset_email(&user.email, frontend, &token),
    };
    if let Err(e) = state.mailer.send(email).await {
        tracing::error!(user_id = user.id, purpose = purpose.as_str(), error = %e, "failed to send mail");
    }
    Ok(())
}

// ============================================================================
// Signup, login and email flows
// ============================================================================

#[derive(Debug, Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    name: String,
}

impl SignupRequest {
    fn validate(&self) -> Result<(String, String), ApiError> {
        let email = normalize_email(&self.email).ok_or_else(|| ApiError::bad_request("Invalid email"))?;
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(ApiError::bad_request("Name must be 1-100 characters"));
        }
        check_password(&self.password)?;
        Ok((email, name.to_string()))
    }
}

/// POST /auth/signup - Create a password account and mail a verification link
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let (email, name) = req.validate()?;
    let password_hash = session::hash_password(&req.password).log_500("password hashing failed")?;

    let user = state
        .store
        .create_user(NewUser {
            email,
            name,
            password_hash: Some(password_hash),
            google_id: None,
            email_verified: false,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Conflict("Email already registered".into()),
            e => e.into(),
        })?;

    send_token_mail(&state, &user, TokenPurpose::VerifyEmail).await?;
    tracing::info!(user_id = user.id, "user signed up");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// POST /auth/login - Password login; sets the session cookies
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let email = normalize_email(&req.email).ok_or_else(invalid)?;
    let user = state.store.user_by_email(&email).await?.ok_or_else(invalid)?;

    // Google-only accounts have no password
    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !session::verify_password(&req.password, hash) {
        return Err(invalid());
    }
    if !user.email_verified {
        return Err(ApiError::forbidden("Email not verified"));
    }

    let user_id = user.id;
    let response = Json(UserResponse::from(user)).into_response();
    start_session(&state, user_id, response).await
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

/// POST /auth/verify-email - Consume a verification token
async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenBody>,
) -> Result<StatusCode, ApiError> {
    let user_id = state
        .store
        .take_email_token(req.token.trim(), TokenPurpose::VerifyEmail, Utc::now())
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired token"))?;

    state.store.mark_email_verified(user_id).await?;
    tracing::info!(user_id, "email verified");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct EmailBody {
    email: String,
}

/// POST /auth/resend-verification - Always 204 so account existence doesn't leak
async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailBody>,
) -> Result<StatusCode, ApiError> {
    if let Some(email) = normalize_email(&req.email) {
        if let Some(user) = state.store.user_by_email(&email).await? {
            if !user.email_verified {
                send_token_mail(&state, &user, TokenPurpose::VerifyEmail).await?;
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/forgot-password - Always 204 so account existence doesn't leak
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailBody>,
) -> Result<StatusCode, ApiError> {
    if let Some(email) = normalize_email(&req.email) {
        if let Some(user) = state.store.user_by_email(&email).await? {
            send_token_mail(&state, &user, TokenPurpose::ResetPassword).await?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    token: String,
    password: String,
}

/// POST /auth/reset-password - Set a new password and end every session
async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    check_password(&req.password)?;

    let user_id = state
        .store
        .take_email_token(req.token.trim(), TokenPurpose::ResetPassword, Utc::now())
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired token"))?;

    let hash = session::hash_password(&req.password).log_500("password hashing failed")?;
    state.store.set_password_hash(user_id, &hash).await?;
    // The reset link proved ownership of the address
    state.store.mark_email_verified(user_id).await?;
    state.store.revoke_user_refresh_tokens(user_id).await?;

    tracing::info!(user_id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Session endpoints
// ============================================================================

/// POST /auth/refresh - Rotate the refresh token and issue a new access token
async fn refresh_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let old_refresh_token = jar
        .get(REFRESH_TOKEN_NAME)
        .map(|c| c.value().to_string())
        .ok_or_else(ApiError::unauthorized)?;

    // Single use: a second refresh with the same token finds nothing
    let new_refresh_token = session::generate_token();
    let now = Utc::now();
    let user_id = state
        .store
        .rotate_refresh_token(
            &old_refresh_token,
            &new_refresh_token,
            now + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
            now,
        )
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    let access_token = session::create_access_token(user_id, &state.config.jwt_cookie_secret)
        .log_500("failed to create access token")?;

    let settings = &state.config.cookies;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_access_cookie(&access_token, settings)?);
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_refresh_cookie(&new_refresh_token, settings)?);

    Ok(response)
}

/// POST /auth/logout - Revoke the refresh token and clear both cookies
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(refresh_token) = jar.get(REFRESH_TOKEN_NAME) {
        if let Err(e) = state.store.revoke_refresh_token(refresh_token.value()).await {
            // The client is logged out either way
            tracing::warn!(error = %e, "failed to revoke refresh token during logout");
        }
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_access_cookie());
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_refresh_cookie());
    response
}

#[derive(Serialize)]
struct ApiTokenResponse {
    api_token: String,
    token_type: &'static str,
    expires_in_days: i64,
}

/// POST /auth/token - Mint a bearer API token from a browser session
async fn issue_api_token(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
) -> Result<(StatusCode, Json<ApiTokenResponse>), ApiError> {
    if state.store.user_by_id(user_id).await?.is_none() {
        return Err(ApiError::unauthorized());
    }

    let api_token = session::create_api_token(user_id, &state.config.jwt_bearer_secret)
        .log_500("failed to create API token")?;
    tracing::info!(user_id, "API token issued");

    Ok((
        StatusCode::CREATED,
        Json(ApiTokenResponse {
            api_token,
            token_type: "Bearer",
            expires_in_days: REFRESH_TOKEN_EXPIRY_DAYS,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), Some("ada@example.com".into()));
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a@localhost"), None);
        assert_eq!(normalize_email("a@b@c.com"), None);
        assert_eq!(normalize_email("a b@c.com"), None);
    }

    #[test]
    fn test_signup_validation() {
        let ok = SignupRequest {
            email: "New@Example.com".into(),
            password: "long enough".into(),
            name: " Ada ".into(),
        };
        assert_eq!(ok.validate().unwrap(), ("new@example.com".into(), "Ada".into()));

        let short = SignupRequest {
            password: "short".into(),
            ..ok
        };
        assert!(matches!(short.validate(), Err(ApiError::BadRequest(_))));
    }
}
