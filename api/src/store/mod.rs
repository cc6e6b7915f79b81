//! Data-access interface.
//!
//! Handlers, services and jobs talk to persistence only through these traits.
//! [`PgStore`] backs them with PostgreSQL via the `domain` query functions;
//! [`MemoryStore`] keeps everything in process for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::access::{Invitation, NewInvitation, WallMember};
use crate::domain::billing::{Plan, Subscription, SubscriptionStatus, SubscriptionUpsert};
use crate::domain::handle_queue::HandleQueueEntry;
use crate::domain::tokens::TokenPurpose;
use crate::domain::tweets::{Engagement, NewTweet, Tweet, TweetFilter};
use crate::domain::users::{NewUser, Role, User, UserUpdate};
use crate::domain::walls::{NewSocialLink, NewWall, SocialLink, Wall, WallUpdate};
use crate::pagination::{Page, PageRequest};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email or Google id is taken
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, user_id: i64) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>>;
    async fn link_google_id(&self, user_id: i64, google_id: &str) -> StoreResult<()>;
    async fn mark_email_verified(&self, user_id: i64) -> StoreResult<()>;
    async fn set_password_hash(&self, user_id: i64, password_hash: &str) -> StoreResult<()>;
    async fn update_user(&self, user_id: i64, update: UserUpdate) -> StoreResult<Option<User>>;
    async fn delete_user(&self, user_id: i64) -> StoreResult<bool>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn role(&self, name: &str) -> StoreResult<Option<Role>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_email_token(
        &self,
        token: &str,
        user_id: i64,
        purpose: TokenPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Consume a live token, returning its user
    async fn take_email_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;
    async fn save_refresh_token(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Swap `old` for `new` atomically; None when `old` is unknown or expired
    async fn rotate_refresh_token(
        &self,
        old: &str,
        new: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;
    async fn revoke_refresh_token(&self, token: &str) -> StoreResult<()>;
    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> StoreResult<()>;
    async fn save_oauth_state(&self, state: &str, code_verifier: &str) -> StoreResult<()>;
    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<String>>;
}

#[async_trait]
pub trait WallStore: Send + Sync {
    async fn create_wall(&self, new: NewWall) -> StoreResult<Wall>;
    async fn wall_by_id(&self, wall_id: i64) -> StoreResult<Option<Wall>>;
    /// Walls the user owns or has been granted access to, newest first
    async fn list_walls_for_user(&self, user_id: i64, page: PageRequest) -> StoreResult<Page<Wall>>;
    async fn count_owned_walls(&self, owner_id: i64) -> StoreResult<i64>;
    async fn update_wall(&self, wall_id: i64, update: WallUpdate) -> StoreResult<Option<Wall>>;
    /// Cascades to tweets, links, access, invitations and queued handles
    async fn delete_wall(&self, wall_id: i64) -> StoreResult<bool>;
    async fn social_links(&self, wall_id: i64) -> StoreResult<Vec<SocialLink>>;
    async fn replace_social_links(
        &self,
        wall_id: i64,
        links: Vec<NewSocialLink>,
    ) -> StoreResult<Vec<SocialLink>>;
}

#[async_trait]
pub trait TweetStore: Send + Sync {
    async fn count_wall_tweets(&self, wall_id: i64) -> StoreResult<i64>;
    /// Ids in display order
    async fn wall_tweet_ids(&self, wall_id: i64) -> StoreResult<Vec<i64>>;
    async fn ordered_wall_tweets(&self, wall_id: i64) -> StoreResult<Vec<Tweet>>;
    async fn list_wall_tweets(
        &self,
        wall_id: i64,
        filter: &TweetFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Tweet>>;
    async fn tweet_by_id(&self, wall_id: i64, tweet_id: i64) -> StoreResult<Option<Tweet>>;
    async fn source_url_exists(&self, wall_id: i64, source_url: &str) -> StoreResult<bool>;
    /// Append at the end of the order; None when (wall, source_url) exists
    async fn insert_tweet(&self, new: NewTweet) -> StoreResult<Option<Tweet>>;
    async fn delete_tweet(&self, wall_id: i64, tweet_id: i64) -> StoreResult<bool>;
    async fn set_order_index(&self, wall_id: i64, tweet_id: i64, order_index: i32) -> StoreResult<()>;
    async fn all_tweets(&self) -> StoreResult<Vec<Tweet>>;
    async fn update_engagement(&self, tweet_id: i64, engagement: Engagement) -> StoreResult<()>;
}

#[async_trait]
pub trait HandleQueueStore: Send + Sync {
    /// False when the handle is already queued for the wall
    async fn enqueue_handle(&self, wall_id: i64, handle_url: &str) -> StoreResult<bool>;
    async fn oldest_unprocessed_handle(&self) -> StoreResult<Option<HandleQueueEntry>>;
    async fn mark_handle_processed(&self, entry_id: i64) -> StoreResult<()>;
    async fn reset_handle_queue(&self) -> StoreResult<u64>;
    async fn wall_handles(&self, wall_id: i64) -> StoreResult<Vec<HandleQueueEntry>>;
    async fn remove_handle(&self, wall_id: i64, entry_id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn access_role(&self, wall_id: i64, user_id: i64) -> StoreResult<Option<String>>;
    async fn wall_members(&self, wall_id: i64) -> StoreResult<Vec<WallMember>>;
    async fn grant_access(&self, wall_id: i64, user_id: i64, role: &str) -> StoreResult<()>;
    async fn revoke_access(&self, wall_id: i64, user_id: i64) -> StoreResult<bool>;
    async fn create_invitation(&self, new: NewInvitation) -> StoreResult<Invitation>;
    async fn invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>>;
    async fn pending_invitations(&self, wall_id: i64) -> StoreResult<Vec<Invitation>>;
    /// False if already accepted
    async fn accept_invitation(&self, invitation_id: i64) -> StoreResult<bool>;
    async fn delete_invitation(&self, wall_id: i64, invitation_id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn list_plans(&self) -> StoreResult<Vec<Plan>>;
    async fn plan_by_id(&self, plan_id: i64) -> StoreResult<Option<Plan>>;
    async fn plan_by_code(&self, code: &str) -> StoreResult<Option<Plan>>;
    async fn subscription_for_user(&self, user_id: i64) -> StoreResult<Option<Subscription>>;
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<Subscription>;
    async fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;
}

/// Everything the application persists
pub trait Store:
    UserStore + TokenStore + WallStore + TweetStore + HandleQueueStore + AccessStore + BillingStore
{
}

impl<T> Store for T where
    T: UserStore
        + TokenStore
        + WallStore
        + TweetStore
        + HandleQueueStore
        + AccessStore
        + BillingStore
{
}
