//! Billing domain - plan catalog and user subscriptions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Executor, Postgres, Type};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_interval: String,
    #[serde(skip_serializing)]
    pub stripe_price_id: Option<String>,
    pub max_walls: i32,
    pub max_tweets_per_wall: i32,
}

/// Stripe subscription lifecycle, narrowed to the states we act on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Map a Stripe status string; unknown states count as incomplete
    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Whether the subscription currently entitles the user to its plan
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl Type<Postgres> for SubscriptionStatus {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for SubscriptionStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        Ok(SubscriptionStatus::from_str(&s))
    }
}

impl Encode<'_, Postgres> for SubscriptionStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.as_str().to_owned(), buf)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert-or-replace payload keyed by user
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: i64,
    pub plan_id: i64,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

const PLAN_COLUMNS: &str = "id, code, name, price_cents, currency, billing_interval, \
    stripe_price_id, max_walls, max_tweets_per_wall";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, stripe_customer_id, \
    stripe_subscription_id, current_period_end, created_at, updated_at";

pub async fn list_plans<'e, E>(executor: E) -> Result<Vec<Plan>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_cents, id");
    sqlx::query_as(&query).fetch_all(executor).await
}

pub async fn get_plan_by_id<'e, E>(executor: E, plan_id: i64) -> Result<Option<Plan>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1");
    sqlx::query_as(&query)
        .bind(plan_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_plan_by_code<'e, E>(executor: E, code: &str) -> Result<Option<Plan>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE code = $1");
    sqlx::query_as(&query)
        .bind(code)
        .fetch_optional(executor)
        .await
}

pub async fn get_subscription_for_user<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<Subscription>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1");
    sqlx::query_as(&query)
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

pub async fn upsert_subscription<'e, E>(
    executor: E,
    upsert: &SubscriptionUpsert,
) -> Result<Subscription, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO subscriptions (user_id, plan_id, status, stripe_customer_id,
                                   stripe_subscription_id, current_period_end)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE SET
            plan_id = EXCLUDED.plan_id,
            status = EXCLUDED.status,
            stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
            stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
            current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
            updated_at = NOW()
        RETURNING {SUBSCRIPTION_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(upsert.user_id)
        .bind(upsert.plan_id)
        .bind(upsert.status)
        .bind(&upsert.stripe_customer_id)
        .bind(&upsert.stripe_subscription_id)
        .bind(upsert.current_period_end)
        .fetch_one(executor)
        .await
}

/// Apply a status change reported by Stripe. Returns false for unknown subscriptions.
pub async fn update_status_by_stripe_id<'e, E>(
    executor: E,
    stripe_subscription_id: &str,
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE subscriptions SET
            status = $2,
            current_period_end = COALESCE($3, current_period_end),
            updated_at = NOW()
        WHERE stripe_subscription_id = $1
        "#,
    )
    .bind(stripe_subscription_id)
    .bind(status)
    .bind(current_period_end)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
