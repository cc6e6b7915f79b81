//! PostgreSQL-backed store. Each method delegates to a `domain` query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    AccessStore, BillingStore, HandleQueueStore, StoreError, StoreResult, TokenStore, TweetStore,
    UserStore, WallStore,
};
use crate::domain::access::{self, Invitation, NewInvitation, WallMember};
use crate::domain::billing::{self, Plan, Subscription, SubscriptionStatus, SubscriptionUpsert};
use crate::domain::handle_queue::{self, HandleQueueEntry};
use crate::domain::tokens::{self, TokenPurpose};
use crate::domain::tweets::{self, Engagement, NewTweet, Tweet, TweetFilter};
use crate::domain::users::{self, NewUser, Role, User, UserUpdate};
use crate::domain::walls::{self, NewSocialLink, NewWall, SocialLink, Wall, WallUpdate};
use crate::pagination::{Page, PageRequest};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn conflict_on_unique(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already exists"))
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        users::insert_user(&self.pool, &new)
            .await
            .map_err(|e| conflict_on_unique(e, "user"))
    }

    async fn user_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(users::get_user_by_id(&self.pool, user_id).await?)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(users::get_user_by_email(&self.pool, email).await?)
    }

    async fn user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        Ok(users::get_user_by_google_id(&self.pool, google_id).await?)
    }

    async fn link_google_id(&self, user_id: i64, google_id: &str) -> StoreResult<()> {
        users::link_google_id(&self.pool, user_id, google_id)
            .await
            .map_err(|e| conflict_on_unique(e, "google account"))
    }

    async fn mark_email_verified(&self, user_id: i64) -> StoreResult<()> {
        Ok(users::mark_email_verified(&self.pool, user_id).await?)
    }

    async fn set_password_hash(&self, user_id: i64, password_hash: &str) -> StoreResult<()> {
        Ok(users::set_password_hash(&self.pool, user_id, password_hash).await?)
    }

    async fn update_user(&self, user_id: i64, update: UserUpdate) -> StoreResult<Option<User>> {
        Ok(users::update_user(&self.pool, user_id, &update).await?)
    }

    async fn delete_user(&self, user_id: i64) -> StoreResult<bool> {
        Ok(users::delete_user(&self.pool, user_id).await?)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(users::list_roles(&self.pool).await?)
    }

    async fn role(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(users::get_role(&self.pool, name).await?)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn save_email_token(
        &self,
        token: &str,
        user_id: i64,
        purpose: TokenPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(tokens::insert_email_token(&self.pool, token, user_id, purpose, expires_at).await?)
    }

    async fn take_email_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        Ok(tokens::take_email_token(&self.pool, token, purpose, now).await?)
    }

    async fn save_refresh_token(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(tokens::insert_refresh_token(&self.pool, token, user_id, expires_at).await?)
    }

    async fn rotate_refresh_token(
        &self,
        old: &str,
        new: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        Ok(tokens::rotate_refresh_token(&self.pool, old, new, expires_at, now).await?)
    }

    async fn revoke_refresh_token(&self, token: &str) -> StoreResult<()> {
        Ok(tokens::delete_refresh_token(&self.pool, token).await?)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> StoreResult<()> {
        Ok(tokens::delete_user_refresh_tokens(&self.pool, user_id).await?)
    }

    async fn save_oauth_state(&self, state: &str, code_verifier: &str) -> StoreResult<()> {
        Ok(tokens::insert_oauth_state(&self.pool, state, code_verifier).await?)
    }

    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<String>> {
        Ok(tokens::take_oauth_state(&self.pool, state).await?)
    }
}

#[async_trait]
impl WallStore for PgStore {
    async fn create_wall(&self, new: NewWall) -> StoreResult<Wall> {
        Ok(walls::insert_wall(&self.pool, &new).await?)
    }

    async fn wall_by_id(&self, wall_id: i64) -> StoreResult<Option<Wall>> {
        Ok(walls::get_wall(&self.pool, wall_id).await?)
    }

    async fn list_walls_for_user(&self, user_id: i64, page: PageRequest) -> StoreResult<Page<Wall>> {
        let total = walls::count_walls_for_user(&self.pool, user_id).await?;
        let items = walls::list_walls_for_user(&self.pool, user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    async fn count_owned_walls(&self, owner_id: i64) -> StoreResult<i64> {
        Ok(walls::count_owned_walls(&self.pool, owner_id).await?)
    }

    async fn update_wall(&self, wall_id: i64, update: WallUpdate) -> StoreResult<Option<Wall>> {
        Ok(walls::update_wall(&self.pool, wall_id, &update).await?)
    }

    async fn delete_wall(&self, wall_id: i64) -> StoreResult<bool> {
        Ok(walls::delete_wall(&self.pool, wall_id).await?)
    }

    async fn social_links(&self, wall_id: i64) -> StoreResult<Vec<SocialLink>> {
        Ok(walls::list_social_links(&self.pool, wall_id).await?)
    }

    async fn replace_social_links(
        &self,
        wall_id: i64,
        links: Vec<NewSocialLink>,
    ) -> StoreResult<Vec<SocialLink>> {
        Ok(walls::replace_social_links(&self.pool, wall_id, &links).await?)
    }
}

#[async_trait]
impl TweetStore for PgStore {
    async fn count_wall_tweets(&self, wall_id: i64) -> StoreResult<i64> {
        Ok(tweets::count_wall_tweets(&self.pool, wall_id).await?)
    }

    async fn wall_tweet_ids(&self, wall_id: i64) -> StoreResult<Vec<i64>> {
        Ok(tweets::list_wall_tweet_ids(&self.pool, wall_id).await?)
    }

    async fn ordered_wall_tweets(&self, wall_id: i64) -> StoreResult<Vec<Tweet>> {
        Ok(tweets::list_ordered_wall_tweets(&self.pool, wall_id).await?)
    }

    async fn list_wall_tweets(
        &self,
        wall_id: i64,
        filter: &TweetFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Tweet>> {
        let total = tweets::count_filtered_wall_tweets(&self.pool, wall_id, filter).await?;
        let items = tweets::list_wall_tweets_paginated(&self.pool, wall_id, filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    async fn tweet_by_id(&self, wall_id: i64, tweet_id: i64) -> StoreResult<Option<Tweet>> {
        Ok(tweets::get_tweet(&self.pool, wall_id, tweet_id).await?)
    }

    async fn source_url_exists(&self, wall_id: i64, source_url: &str) -> StoreResult<bool> {
        Ok(tweets::source_url_exists(&self.pool, wall_id, source_url).await?)
    }

    async fn insert_tweet(&self, new: NewTweet) -> StoreResult<Option<Tweet>> {
        Ok(tweets::insert_tweet(&self.pool, &new).await?)
    }

    async fn delete_tweet(&self, wall_id: i64, tweet_id: i64) -> StoreResult<bool> {
        Ok(tweets::delete_tweet(&self.pool, wall_id, tweet_id).await?)
    }

    async fn set_order_index(&self, wall_id: i64, tweet_id: i64, order_index: i32) -> StoreResult<()> {
        Ok(tweets::set_order_index(&self.pool, wall_id, tweet_id, order_index).await?)
    }

    async fn all_tweets(&self) -> StoreResult<Vec<Tweet>> {
        Ok(tweets::list_all_tweets(&self.pool).await?)
    }

    async fn update_engagement(&self, tweet_id: i64, engagement: Engagement) -> StoreResult<()> {
        Ok(tweets::update_engagement(&self.pool, tweet_id, engagement).await?)
    }
}

#[async_trait]
impl HandleQueueStore for PgStore {
    async fn enqueue_handle(&self, wall_id: i64, handle_url: &str) -> StoreResult<bool> {
        Ok(handle_queue::enqueue_handle(&self.pool, wall_id, handle_url).await?)
    }

    async fn oldest_unprocessed_handle(&self) -> StoreResult<Option<HandleQueueEntry>> {
        Ok(handle_queue::oldest_unprocessed(&self.pool).await?)
    }

    async fn mark_handle_processed(&self, entry_id: i64) -> StoreResult<()> {
        Ok(handle_queue::mark_processed(&self.pool, entry_id).await?)
    }

    async fn reset_handle_queue(&self) -> StoreResult<u64> {
        Ok(handle_queue::reset_all(&self.pool).await?)
    }

    async fn wall_handles(&self, wall_id: i64) -> StoreResult<Vec<HandleQueueEntry>> {
        Ok(handle_queue::list_for_wall(&self.pool, wall_id).await?)
    }

    async fn remove_handle(&self, wall_id: i64, entry_id: i64) -> StoreResult<bool> {
        Ok(handle_queue::delete_entry(&self.pool, wall_id, entry_id).await?)
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn access_role(&self, wall_id: i64, user_id: i64) -> StoreResult<Option<String>> {
        Ok(access::get_access_role(&self.pool, wall_id, user_id).await?)
    }

    async fn wall_members(&self, wall_id: i64) -> StoreResult<Vec<WallMember>> {
        Ok(access::list_members(&self.pool, wall_id).await?)
    }

    async fn grant_access(&self, wall_id: i64, user_id: i64, role: &str) -> StoreResult<()> {
        Ok(access::grant_access(&self.pool, wall_id, user_id, role).await?)
    }

    async fn revoke_access(&self, wall_id: i64, user_id: i64) -> StoreResult<bool> {
        Ok(access::revoke_access(&self.pool, wall_id, user_id).await?)
    }

    async fn create_invitation(&self, new: NewInvitation) -> StoreResult<Invitation> {
        access::insert_invitation(&self.pool, &new)
            .await
            .map_err(|e| conflict_on_unique(e, "invitation"))
    }

    async fn invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        Ok(access::get_invitation_by_token(&self.pool, token).await?)
    }

    async fn pending_invitations(&self, wall_id: i64) -> StoreResult<Vec<Invitation>> {
        Ok(access::list_pending_invitations(&self.pool, wall_id).await?)
    }

    async fn accept_invitation(&self, invitation_id: i64) -> StoreResult<bool> {
        Ok(access::mark_invitation_accepted(&self.pool, invitation_id).await?)
    }

    async fn delete_invitation(&self, wall_id: i64, invitation_id: i64) -> StoreResult<bool> {
        Ok(access::delete_invitation(&self.pool, wall_id, invitation_id).await?)
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn list_plans(&self) -> StoreResult<Vec<Plan>> {
        Ok(billing::list_plans(&self.pool).await?)
    }

    async fn plan_by_id(&self, plan_id: i64) -> StoreResult<Option<Plan>> {
        Ok(billing::get_plan_by_id(&self.pool, plan_id).await?)
    }

    async fn plan_by_code(&self, code: &str) -> StoreResult<Option<Plan>> {
        Ok(billing::get_plan_by_code(&self.pool, code).await?)
    }

    async fn subscription_for_user(&self, user_id: i64) -> StoreResult<Option<Subscription>> {
        Ok(billing::get_subscription_for_user(&self.pool, user_id).await?)
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<Subscription> {
        Ok(billing::upsert_subscription(&self.pool, &upsert).await?)
    }

    async fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        Ok(billing::update_status_by_stripe_id(
            &self.pool,
            stripe_subscription_id,
            status,
            current_period_end,
        )
        .await?)
    }
}
