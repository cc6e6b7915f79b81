//! Plans and subscriptions (/plans, /subscriptions/*)

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::auth::AuthUser;
use crate::AppState;
use crate::domain::billing::{Plan, SubscriptionStatus};
use crate::services::billing::{self, FREE_PLAN};
use crate::services::error::{ApiError, LogErr};
use crate::services::stripe::{CheckoutParams, StripeClient, StripeError};
use crate::store::{BillingStore, UserStore};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/subscriptions/me", get(my_subscription))
        .route("/subscriptions/checkout", post(checkout))
        .route("/subscriptions/webhook", post(webhook))
}

fn stripe_client(state: &AppState) -> Result<&StripeClient, ApiError> {
    state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Billing is not configured".into()))
}

/// GET /plans - Plan catalog, cheapest first
async fn list_plans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Plan>>, ApiError> {
    Ok(Json(state.store.list_plans().await?))
}

#[derive(Debug, Serialize)]
struct SubscriptionResponse {
    plan: Plan,
    status: SubscriptionStatus,
    /// Whether the plan's limits currently apply
    active: bool,
    current_period_end: Option<DateTime<Utc>>,
}

/// GET /subscriptions/me - The caller's subscription, or null
async fn my_subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<SubscriptionResponse>>, ApiError> {
    let Some(sub) = state.store.subscription_for_user(user_id).await? else {
        return Ok(Json(None));
    };
    let plan = state
        .store
        .plan_by_id(sub.plan_id)
        .await?
        .ok_or_else(ApiError::internal)?;

    Ok(Json(Some(SubscriptionResponse {
        plan,
        status: sub.status,
        active: sub.status.is_entitled(),
        current_period_end: sub.current_period_end,
    })))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    plan_code: String,
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    session_id: String,
    url: String,
}

/// POST /subscriptions/checkout - Start a Stripe checkout for a paid plan
async fn checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let stripe = stripe_client(&state)?;

    let plan_code = req.plan_code.trim().to_lowercase();
    if plan_code == FREE_PLAN {
        return Err(ApiError::bad_request("The free plan needs no checkout"));
    }
    let plan = state
        .store
        .plan_by_code(&plan_code)
        .await?
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;
    let price_id = plan
        .stripe_price_id
        .clone()
        .ok_or_else(|| ApiError::bad_request("Plan is not available for purchase"))?;

    let user = state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    let frontend = state.config.frontend_url.trim_end_matches('/');
    let session = stripe
        .create_checkout_session(&CheckoutParams {
            price_id,
            user_id,
            plan_code: plan.code,
            customer_email: user.email,
            success_url: format!("{frontend}/billing/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{frontend}/billing"),
        })
        .await
        .log_500("Stripe checkout session failed")?;

    let url = session.url.ok_or_else(|| {
        tracing::error!(session_id = %session.id, "checkout session without URL");
        ApiError::internal()
    })?;
    tracing::info!(user_id, session_id = %session.id, "checkout started");

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url,
    }))
}

/// POST /subscriptions/webhook - Stripe event delivery, signature checked
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stripe = stripe_client(&state)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    let event = stripe
        .construct_event(&body, signature, Utc::now().timestamp())
        .map_err(|e| {
            tracing::warn!(error = %e, "rejected webhook delivery");
            match e {
                StripeError::MalformedEvent(_) => ApiError::bad_request("Malformed event"),
                _ => ApiError::bad_request("Invalid signature"),
            }
        })?;

    let outcome = billing::apply_webhook_event(state.store.as_ref(), &event).await?;
    tracing::info!(event_id = %event.id, event_type = %event.event_type, outcome = ?outcome, "webhook processed");

    Ok(Json(json!({ "received": true })))
}
