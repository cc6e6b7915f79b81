//! Plan resolution and Stripe webhook handling

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::domain::billing::{Plan, SubscriptionStatus, SubscriptionUpsert};
use crate::services::stripe::WebhookEvent;
use crate::store::{BillingStore, Store, StoreError, UserStore};

pub const FREE_PLAN: &str = "free";

/// The plan whose limits apply to a user right now
///
/// An entitled (active or trialing) subscription selects its plan; anything
/// else falls back to the free plan.
pub async fn effective_plan(store: &dyn Store, user_id: i64) -> Result<Option<Plan>, StoreError> {
    if let Some(sub) = store.subscription_for_user(user_id).await? {
        if sub.status.is_entitled() {
            if let Some(plan) = store.plan_by_id(sub.plan_id).await? {
                return Ok(Some(plan));
            }
        }
    }
    store.plan_by_code(FREE_PLAN).await
}

/// What a webhook delivery changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    SubscriptionActivated { user_id: i64, plan_code: String },
    StatusChanged { subscription: String, status: SubscriptionStatus },
    UnknownSubscription(String),
    Ignored,
}

fn str_field<'a>(object: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = object;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn period_end(object: &Value) -> Option<DateTime<Utc>> {
    let secs = object
        .get("current_period_end")
        .and_then(Value::as_i64)
        .or_else(|| {
            object
                .pointer("/items/data/0/current_period_end")
                .and_then(Value::as_i64)
        })?;
    Utc.timestamp_opt(secs, 0).single()
}

pub async fn apply_webhook_event(
    store: &dyn Store,
    event: &WebhookEvent,
) -> Result<WebhookOutcome, StoreError> {
    let object = &event.data.object;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let user_id = str_field(object, &["client_reference_id"]).and_then(|s| s.parse::<i64>().ok());
            let plan_code = str_field(object, &["metadata", "plan_code"]);
            let (Some(user_id), Some(plan_code)) = (user_id, plan_code) else {
                tracing::warn!(event_id = %event.id, "checkout session without user or plan");
                return Ok(WebhookOutcome::Ignored);
            };
            let Some(plan) = store.plan_by_code(plan_code).await? else {
                tracing::warn!(event_id = %event.id, plan_code, "checkout for unknown plan");
                return Ok(WebhookOutcome::Ignored);
            };
            if store.user_by_id(user_id).await?.is_none() {
                tracing::warn!(event_id = %event.id, user_id, "checkout for unknown user");
                return Ok(WebhookOutcome::Ignored);
            }

            store
                .upsert_subscription(SubscriptionUpsert {
                    user_id,
                    plan_id: plan.id,
                    status: SubscriptionStatus::Active,
                    stripe_customer_id: str_field(object, &["customer"]).map(String::from),
                    stripe_subscription_id: str_field(object, &["subscription"]).map(String::from),
                    current_period_end: None,
                })
                .await?;
            tracing::info!(user_id, plan = %plan.code, "subscription activated");
            Ok(WebhookOutcome::SubscriptionActivated {
                user_id,
                plan_code: plan.code,
            })
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let Some(sub_id) = str_field(object, &["id"]) else {
                return Ok(WebhookOutcome::Ignored);
            };
            let status = if event.event_type == "customer.subscription.deleted" {
                SubscriptionStatus::Canceled
            } else {
                SubscriptionStatus::from_str(str_field(object, &["status"]).unwrap_or_default())
            };
            update_status(store, sub_id, status, period_end(object)).await
        }
        "invoice.payment_failed" => {
            let sub_id = str_field(object, &["subscription"])
                .or_else(|| str_field(object, &["parent", "subscription_details", "subscription"]));
            match sub_id {
                Some(sub_id) => update_status(store, sub_id, SubscriptionStatus::PastDue, None).await,
                None => Ok(WebhookOutcome::Ignored),
            }
        }
        other => {
            tracing::debug!(event_type = other, "ignoring webhook event");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

async fn update_status(
    store: &dyn Store,
    subscription: &str,
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
) -> Result<WebhookOutcome, StoreError> {
    if store
        .update_subscription_status(subscription, status, current_period_end)
        .await?
    {
        tracing::info!(subscription, status = status.as_str(), "subscription status changed");
        Ok(WebhookOutcome::StatusChanged {
            subscription: subscription.to_string(),
            status,
        })
    } else {
        tracing::warn!(subscription, "webhook for unknown subscription");
        Ok(WebhookOutcome::UnknownSubscription(subscription.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::users::NewUser;
    use crate::services::stripe::WebhookData;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn event(event_type: &str, object: Value) -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".into(),
            event_type: event_type.into(),
            data: WebhookData { object },
        }
    }

    async fn user(store: &MemoryStore) -> i64 {
        store
            .create_user(NewUser {
                email: "payer@example.com".into(),
                name: "Payer".into(),
                password_hash: None,
                google_id: None,
                email_verified: true,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_free_plan_without_subscription() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let plan = effective_plan(&store, user_id).await.unwrap().unwrap();
        assert_eq!(plan.code, FREE_PLAN);
    }

    #[tokio::test]
    async fn test_checkout_then_lifecycle() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;

        let outcome = apply_webhook_event(
            &store,
            &event(
                "checkout.session.completed",
                json!({
                    "client_reference_id": user_id.to_string(),
                    "customer": "cus_1",
                    "subscription": "sub_1",
                    "metadata": {"plan_code": "pro"}
                }),
            ),
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::SubscriptionActivated {
                user_id,
                plan_code: "pro".into()
            }
        );
        assert_eq!(effective_plan(&store, user_id).await.unwrap().unwrap().code, "pro");

        apply_webhook_event(
            &store,
            &event("invoice.payment_failed", json!({"subscription": "sub_1"})),
        )
        .await
        .unwrap();
        let sub = store.subscription_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(effective_plan(&store, user_id).await.unwrap().unwrap().code, FREE_PLAN);

        apply_webhook_event(
            &store,
            &event(
                "customer.subscription.updated",
                json!({"id": "sub_1", "status": "active", "current_period_end": 1_900_000_000}),
            ),
        )
        .await
        .unwrap();
        let sub = store.subscription_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end.unwrap().timestamp(), 1_900_000_000);

        apply_webhook_event(
            &store,
            &event("customer.subscription.deleted", json!({"id": "sub_1", "status": "canceled"})),
        )
        .await
        .unwrap();
        let sub = store.subscription_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_unknown_events_ignored() {
        let store = MemoryStore::new();
        let outcome = apply_webhook_event(&store, &event("charge.refunded", json!({})))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = apply_webhook_event(
            &store,
            &event("customer.subscription.updated", json!({"id": "sub_x", "status": "active"})),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::UnknownSubscription("sub_x".into()));
    }
}
