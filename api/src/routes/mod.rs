pub mod access;
pub mod auth;
pub mod media;
pub mod oauth;
pub mod subscriptions;
pub mod tweets;
pub mod user;
pub mod walls;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(oauth::routes())
        .merge(user::routes())
        .merge(walls::routes())
        .merge(tweets::routes())
        .merge(access::routes())
        .merge(subscriptions::routes())
        .merge(media::routes())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
