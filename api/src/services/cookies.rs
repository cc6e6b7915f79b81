//! Cookie building utilities for session management
//!
//! Centralizes cookie formatting so login, Google sign-in, refresh and logout
//! all emit identical attributes.

use axum::http::HeaderValue;

use crate::config::CookieSettings;
use crate::services::error::{ApiError, LogErr};

/// Cookie names and lifetimes
pub mod config {
    pub const ACCESS_TOKEN_NAME: &str = "access_token";
    pub const REFRESH_TOKEN_NAME: &str = "refresh_token";
    /// 10 minutes
    pub const ACCESS_TOKEN_MAX_AGE_SECS: u32 = 600;
    /// 30 days
    pub const REFRESH_TOKEN_MAX_AGE_SECS: u32 = 30 * 24 * 60 * 60;
    pub const COOKIE_PATH: &str = "/";
}

fn build(name: &str, value: &str, max_age: u32, settings: &CookieSettings) -> String {
    let secure = if settings.secure { " Secure;" } else { "" };
    format!(
        "{}={}; HttpOnly;{} SameSite={}; Path={}; Max-Age={}",
        name,
        value,
        secure,
        settings.same_site.as_str(),
        config::COOKIE_PATH,
        max_age
    )
}

/// Build an access token Set-Cookie header value
pub fn build_access_cookie(token: &str, settings: &CookieSettings) -> Result<HeaderValue, ApiError> {
    build(
        config::ACCESS_TOKEN_NAME,
        token,
        config::ACCESS_TOKEN_MAX_AGE_SECS,
        settings,
    )
    .parse::<HeaderValue>()
    .log_500("Failed to parse access cookie header")
}

/// Build a refresh token Set-Cookie header value
pub fn build_refresh_cookie(token: &str, settings: &CookieSettings) -> Result<HeaderValue, ApiError> {
    build(
        config::REFRESH_TOKEN_NAME,
        token,
        config::REFRESH_TOKEN_MAX_AGE_SECS,
        settings,
    )
    .parse::<HeaderValue>()
    .log_500("Failed to parse refresh cookie header")
}

/// Build a Set-Cookie header to clear the access token
pub fn build_clear_access_cookie() -> HeaderValue {
    HeaderValue::from_static("access_token=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

/// Build a Set-Cookie header to clear the refresh token
pub fn build_clear_refresh_cookie() -> HeaderValue {
    HeaderValue::from_static("refresh_token=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}
