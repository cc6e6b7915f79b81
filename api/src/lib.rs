//! Wall of Love API: curated tweet walls with shared access and paid plans

pub mod config;
pub mod constants;
pub mod domain;
pub mod jobs;
pub mod pagination;
pub mod routes;
pub mod services;
pub mod storage;
pub mod store;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    middleware,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::constants::MAX_IMAGE_UPLOAD_SIZE;
use crate::services::error::{ApiError, error_path_layer};
use crate::services::google::GoogleClient;
use crate::services::mailer::Mailer;
use crate::services::stripe::StripeClient;
use crate::services::twitter::TweetSource;
use crate::storage::MediaStorage;
use crate::store::Store;

/// Shared handler state; every field is cheap to share across requests
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tweets: Arc<dyn TweetSource>,
    pub mailer: Arc<dyn Mailer>,
    pub media: MediaStorage,
    /// None when Stripe isn't configured
    pub stripe: Option<StripeClient>,
    /// None when Google sign-in isn't configured
    pub google: Option<GoogleClient>,
    pub config: Arc<Config>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

/// The full HTTP application: every route under `/api` plus the middleware chain
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .nest("/api", routes::build_routes())
        .fallback(|| async { ApiError::not_found("Route not found") })
        .layer(DefaultBodyLimit::max(MAX_IMAGE_UPLOAD_SIZE))
        .layer(middleware::from_fn(error_path_layer))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
