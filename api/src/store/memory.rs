//! In-process store used by tests and `STORE_BACKEND=memory` runs.
//!
//! Mirrors the PostgreSQL schema closely enough that handlers behave the
//! same: unique constraints, cascades, seeded roles and plans.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{
    AccessStore, BillingStore, HandleQueueStore, StoreError, StoreResult, TokenStore, TweetStore,
    UserStore, WallStore,
};
use crate::domain::access::{Invitation, NewInvitation, WallMember};
use crate::domain::billing::{Plan, Subscription, SubscriptionStatus, SubscriptionUpsert};
use crate::domain::handle_queue::HandleQueueEntry;
use crate::domain::tokens::TokenPurpose;
use crate::domain::tweets::{Engagement, NewTweet, Tweet, TweetFilter};
use crate::domain::users::{NewUser, Role, User, UserUpdate};
use crate::domain::walls::{NewSocialLink, NewWall, SocialLink, Wall, WallUpdate};
use crate::pagination::{Page, PageRequest};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

struct EmailToken {
    user_id: i64,
    purpose: TokenPurpose,
    expires_at: DateTime<Utc>,
}

struct RefreshToken {
    user_id: i64,
    expires_at: DateTime<Utc>,
}

struct AccessGrant {
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemState {
    next_id: i64,
    roles: Vec<Role>,
    users: Vec<User>,
    email_tokens: HashMap<String, EmailToken>,
    refresh_tokens: HashMap<String, RefreshToken>,
    oauth_states: HashMap<String, (String, DateTime<Utc>)>,
    walls: Vec<Wall>,
    social_links: Vec<SocialLink>,
    tweets: Vec<Tweet>,
    handles: Vec<HandleQueueEntry>,
    access: HashMap<(i64, i64), AccessGrant>,
    invitations: Vec<Invitation>,
    plans: Vec<Plan>,
    subscriptions: Vec<Subscription>,
}

impl MemState {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn seeded() -> Self {
        let role = |name: &str, permissions: &[&str]| Role {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        };
        let plan = |id: i64, code: &str, name: &str, price_cents: i64, walls: i32, tweets: i32| Plan {
            id,
            code: code.to_string(),
            name: name.to_string(),
            price_cents,
            currency: "usd".to_string(),
            billing_interval: "month".to_string(),
            stripe_price_id: None,
            max_walls: walls,
            max_tweets_per_wall: tweets,
        };

        Self {
            next_id: 100,
            roles: vec![
                role(
                    "owner",
                    &["wall:view", "wall:edit", "wall:delete", "tweet:manage", "access:manage"],
                ),
                role("editor", &["wall:view", "wall:edit", "tweet:manage"]),
                role("viewer", &["wall:view"]),
                role(
                    "admin",
                    &[
                        "wall:view",
                        "wall:edit",
                        "wall:delete",
                        "tweet:manage",
                        "access:manage",
                        "billing:manage",
                    ],
                ),
                role("user", &["billing:manage"]),
            ],
            plans: vec![
                plan(1, "free", "Free", 0, 1, 25),
                plan(2, "pro", "Pro", 900, 10, 500),
                plan(3, "business", "Business", 2900, 100, 5000),
            ],
            ..Default::default()
        }
    }

    fn remove_wall_children(&mut self, wall_id: i64) {
        self.social_links.retain(|l| l.wall_id != wall_id);
        self.tweets.retain(|t| t.wall_id != wall_id);
        self.handles.retain(|h| h.wall_id != wall_id);
        self.access.retain(|(w, _), _| *w != wall_id);
        self.invitations.retain(|i| i.wall_id != wall_id);
    }
}

pub struct MemoryStore {
    inner: Mutex<MemState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemState::seeded()),
        }
    }

    /// Point a plan at a Stripe price (the catalog is otherwise read-only)
    pub fn set_stripe_price(&self, plan_code: &str, price_id: &str) {
        let mut state = self.state();
        if let Some(plan) = state.plans.iter_mut().find(|p| p.code == plan_code) {
            plan.stripe_price_id = Some(price_id.to_string());
        }
    }

    /// Change a user's global role
    pub fn set_user_role(&self, user_id: i64, role: &str) {
        let mut state = self.state();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.role = role.to_string();
        }
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn ordered(mut tweets: Vec<Tweet>) -> Vec<Tweet> {
    tweets.sort_by_key(|t| (t.order_index, t.id));
    tweets
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state();
        if state.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict("user already exists".into()));
        }
        if let Some(gid) = &new.google_id {
            if state.users.iter().any(|u| u.google_id.as_ref() == Some(gid)) {
                return Err(StoreError::Conflict("user already exists".into()));
            }
        }
        let user = User {
            id: state.id(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            google_id: new.google_id,
            email_verified: new.email_verified,
            avatar_url: None,
            role: "user".to_string(),
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn link_google_id(&self, user_id: i64, google_id: &str) -> StoreResult<()> {
        let mut state = self.state();
        if state
            .users
            .iter()
            .any(|u| u.id != user_id && u.google_id.as_deref() == Some(google_id))
        {
            return Err(StoreError::Conflict("google account already exists".into()));
        }
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.google_id = Some(google_id.to_string());
            user.email_verified = true;
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: i64) -> StoreResult<()> {
        if let Some(user) = self.state().users.iter_mut().find(|u| u.id == user_id) {
            user.email_verified = true;
        }
        Ok(())
    }

    async fn set_password_hash(&self, user_id: i64, password_hash: &str) -> StoreResult<()> {
        if let Some(user) = self.state().users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = Some(password_hash.to_string());
        }
        Ok(())
    }

    async fn update_user(&self, user_id: i64, update: UserUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state();
        let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(avatar_url) = update.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, user_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        let before = state.users.len();
        state.users.retain(|u| u.id != user_id);
        if state.users.len() == before {
            return Ok(false);
        }

        let owned: Vec<i64> = state
            .walls
            .iter()
            .filter(|w| w.owner_id == user_id)
            .map(|w| w.id)
            .collect();
        for wall_id in owned {
            state.remove_wall_children(wall_id);
        }
        state.walls.retain(|w| w.owner_id != user_id);
        state.email_tokens.retain(|_, t| t.user_id != user_id);
        state.refresh_tokens.retain(|_, t| t.user_id != user_id);
        state.access.retain(|(_, u), _| *u != user_id);
        state.invitations.retain(|i| i.invited_by != user_id);
        state.subscriptions.retain(|s| s.user_id != user_id);
        Ok(true)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut roles = self.state().roles.clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn role(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.state().roles.iter().find(|r| r.name == name).cloned())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save_email_token(
        &self,
        token: &str,
        user_id: i64,
        purpose: TokenPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.state().email_tokens.insert(
            token.to_string(),
            EmailToken {
                user_id,
                purpose,
                expires_at,
            },
        );
        Ok(())
    }

    async fn take_email_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut state = self.state();
        let live = state
            .email_tokens
            .get(token)
            .is_some_and(|t| t.purpose == purpose && t.expires_at > now);
        if !live {
            return Ok(None);
        }
        Ok(state.email_tokens.remove(token).map(|t| t.user_id))
    }

    async fn save_refresh_token(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.state()
            .refresh_tokens
            .insert(token.to_string(), RefreshToken { user_id, expires_at });
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old: &str,
        new: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let mut state = self.state();
        let Some(existing) = state.refresh_tokens.remove(old) else {
            return Ok(None);
        };
        if existing.expires_at <= now {
            return Ok(None);
        }
        let user_id = existing.user_id;
        state
            .refresh_tokens
            .insert(new.to_string(), RefreshToken { user_id, expires_at });
        Ok(Some(user_id))
    }

    async fn revoke_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.state().refresh_tokens.remove(token);
        Ok(())
    }

    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> StoreResult<()> {
        self.state().refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    async fn save_oauth_state(&self, state: &str, code_verifier: &str) -> StoreResult<()> {
        self.state()
            .oauth_states
            .insert(state.to_string(), (code_verifier.to_string(), Utc::now()));
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<String>> {
        let cutoff = Utc::now() - Duration::minutes(OAUTH_STATE_TTL_MINUTES);
        Ok(self
            .state()
            .oauth_states
            .remove(state)
            .filter(|(_, created_at)| *created_at > cutoff)
            .map(|(verifier, _)| verifier))
    }
}

#[async_trait]
impl WallStore for MemoryStore {
    async fn create_wall(&self, new: NewWall) -> StoreResult<Wall> {
        let mut state = self.state();
        let now = Utc::now();
        let wall = Wall {
            id: state.id(),
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            visibility: new.visibility,
            logo_url: None,
            created_at: now,
            updated_at: now,
        };
        state.walls.push(wall.clone());
        Ok(wall)
    }

    async fn wall_by_id(&self, wall_id: i64) -> StoreResult<Option<Wall>> {
        Ok(self.state().walls.iter().find(|w| w.id == wall_id).cloned())
    }

    async fn list_walls_for_user(&self, user_id: i64, page: PageRequest) -> StoreResult<Page<Wall>> {
        let state = self.state();
        let mut walls: Vec<Wall> = state
            .walls
            .iter()
            .filter(|w| w.owner_id == user_id || state.access.contains_key(&(w.id, user_id)))
            .cloned()
            .collect();
        walls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_vec(walls, page))
    }

    async fn count_owned_walls(&self, owner_id: i64) -> StoreResult<i64> {
        Ok(self
            .state()
            .walls
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .count() as i64)
    }

    async fn update_wall(&self, wall_id: i64, update: WallUpdate) -> StoreResult<Option<Wall>> {
        let mut state = self.state();
        let Some(wall) = state.walls.iter_mut().find(|w| w.id == wall_id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            wall.title = title;
        }
        if let Some(description) = update.description {
            // Empty clears
            wall.description = (!description.is_empty()).then_some(description);
        }
        if let Some(visibility) = update.visibility {
            wall.visibility = visibility;
        }
        if let Some(logo_url) = update.logo_url {
            wall.logo_url = Some(logo_url);
        }
        wall.updated_at = Utc::now();
        Ok(Some(wall.clone()))
    }

    async fn delete_wall(&self, wall_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        let before = state.walls.len();
        state.walls.retain(|w| w.id != wall_id);
        if state.walls.len() == before {
            return Ok(false);
        }
        state.remove_wall_children(wall_id);
        Ok(true)
    }

    async fn social_links(&self, wall_id: i64) -> StoreResult<Vec<SocialLink>> {
        let mut links: Vec<SocialLink> = self
            .state()
            .social_links
            .iter()
            .filter(|l| l.wall_id == wall_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| (l.position, l.id));
        Ok(links)
    }

    async fn replace_social_links(
        &self,
        wall_id: i64,
        links: Vec<NewSocialLink>,
    ) -> StoreResult<Vec<SocialLink>> {
        let mut state = self.state();
        state.social_links.retain(|l| l.wall_id != wall_id);
        let mut saved = Vec::with_capacity(links.len());
        for (position, link) in links.into_iter().enumerate() {
            let link = SocialLink {
                id: state.id(),
                wall_id,
                platform: link.platform,
                url: link.url,
                position: position as i32,
            };
            state.social_links.push(link.clone());
            saved.push(link);
        }
        Ok(saved)
    }
}

#[async_trait]
impl TweetStore for MemoryStore {
    async fn count_wall_tweets(&self, wall_id: i64) -> StoreResult<i64> {
        Ok(self
            .state()
            .tweets
            .iter()
            .filter(|t| t.wall_id == wall_id)
            .count() as i64)
    }

    async fn wall_tweet_ids(&self, wall_id: i64) -> StoreResult<Vec<i64>> {
        let tweets = self.ordered_wall_tweets(wall_id).await?;
        Ok(tweets.into_iter().map(|t| t.id).collect())
    }

    async fn ordered_wall_tweets(&self, wall_id: i64) -> StoreResult<Vec<Tweet>> {
        let tweets = self
            .state()
            .tweets
            .iter()
            .filter(|t| t.wall_id == wall_id)
            .cloned()
            .collect();
        Ok(ordered(tweets))
    }

    async fn list_wall_tweets(
        &self,
        wall_id: i64,
        filter: &TweetFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Tweet>> {
        let matching = self
            .state()
            .tweets
            .iter()
            .filter(|t| t.wall_id == wall_id)
            .filter(|t| match &filter.search {
                Some(q) => contains_ci(&t.content, q) || contains_ci(&t.author_name, q),
                None => true,
            })
            .filter(|t| match &filter.author {
                Some(a) => contains_ci(&t.author_handle, a),
                None => true,
            })
            .cloned()
            .collect();
        Ok(Page::from_vec(ordered(matching), page))
    }

    async fn tweet_by_id(&self, wall_id: i64, tweet_id: i64) -> StoreResult<Option<Tweet>> {
        Ok(self
            .state()
            .tweets
            .iter()
            .find(|t| t.id == tweet_id && t.wall_id == wall_id)
            .cloned())
    }

    async fn source_url_exists(&self, wall_id: i64, source_url: &str) -> StoreResult<bool> {
        Ok(self
            .state()
            .tweets
            .iter()
            .any(|t| t.wall_id == wall_id && t.source_url == source_url))
    }

    async fn insert_tweet(&self, new: NewTweet) -> StoreResult<Option<Tweet>> {
        let mut state = self.state();
        let wall_tweets = state.tweets.iter().filter(|t| t.wall_id == new.wall_id);
        let mut next_index = 0;
        for t in wall_tweets {
            if t.source_url == new.source_url {
                return Ok(None);
            }
            next_index = next_index.max(t.order_index + 1);
        }
        let tweet = Tweet {
            id: state.id(),
            wall_id: new.wall_id,
            external_id: new.external_id,
            source_url: new.source_url,
            content: new.content,
            author_name: new.author_name,
            author_handle: new.author_handle,
            author_avatar_url: new.author_avatar_url,
            likes: new.engagement.likes,
            comments: new.engagement.comments,
            retweets: new.engagement.retweets,
            tweeted_at: new.tweeted_at,
            order_index: next_index,
            created_at: Utc::now(),
        };
        state.tweets.push(tweet.clone());
        Ok(Some(tweet))
    }

    async fn delete_tweet(&self, wall_id: i64, tweet_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        let before = state.tweets.len();
        state
            .tweets
            .retain(|t| !(t.id == tweet_id && t.wall_id == wall_id));
        Ok(state.tweets.len() != before)
    }

    async fn set_order_index(&self, wall_id: i64, tweet_id: i64, order_index: i32) -> StoreResult<()> {
        if let Some(tweet) = self
            .state()
            .tweets
            .iter_mut()
            .find(|t| t.id == tweet_id && t.wall_id == wall_id)
        {
            tweet.order_index = order_index;
        }
        Ok(())
    }

    async fn all_tweets(&self) -> StoreResult<Vec<Tweet>> {
        let mut tweets = self.state().tweets.clone();
        tweets.sort_by_key(|t| t.id);
        Ok(tweets)
    }

    async fn update_engagement(&self, tweet_id: i64, engagement: Engagement) -> StoreResult<()> {
        if let Some(tweet) = self.state().tweets.iter_mut().find(|t| t.id == tweet_id) {
            tweet.likes = engagement.likes;
            tweet.comments = engagement.comments;
            tweet.retweets = engagement.retweets;
        }
        Ok(())
    }
}

#[async_trait]
impl HandleQueueStore for MemoryStore {
    async fn enqueue_handle(&self, wall_id: i64, handle_url: &str) -> StoreResult<bool> {
        let mut state = self.state();
        if state
            .handles
            .iter()
            .any(|h| h.wall_id == wall_id && h.handle_url == handle_url)
        {
            return Ok(false);
        }
        let entry = HandleQueueEntry {
            id: state.id(),
            wall_id,
            handle_url: handle_url.to_string(),
            processed: false,
            created_at: Utc::now(),
        };
        state.handles.push(entry);
        Ok(true)
    }

    async fn oldest_unprocessed_handle(&self) -> StoreResult<Option<HandleQueueEntry>> {
        Ok(self
            .state()
            .handles
            .iter()
            .filter(|h| !h.processed)
            .min_by_key(|h| (h.created_at, h.id))
            .cloned())
    }

    async fn mark_handle_processed(&self, entry_id: i64) -> StoreResult<()> {
        if let Some(entry) = self.state().handles.iter_mut().find(|h| h.id == entry_id) {
            entry.processed = true;
        }
        Ok(())
    }

    async fn reset_handle_queue(&self) -> StoreResult<u64> {
        let mut state = self.state();
        let mut reset = 0;
        for entry in state.handles.iter_mut().filter(|h| h.processed) {
            entry.processed = false;
            reset += 1;
        }
        Ok(reset)
    }

    async fn wall_handles(&self, wall_id: i64) -> StoreResult<Vec<HandleQueueEntry>> {
        let mut handles: Vec<HandleQueueEntry> = self
            .state()
            .handles
            .iter()
            .filter(|h| h.wall_id == wall_id)
            .cloned()
            .collect();
        handles.sort_by_key(|h| (h.created_at, h.id));
        Ok(handles)
    }

    async fn remove_handle(&self, wall_id: i64, entry_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        let before = state.handles.len();
        state
            .handles
            .retain(|h| !(h.id == entry_id && h.wall_id == wall_id));
        Ok(state.handles.len() != before)
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn access_role(&self, wall_id: i64, user_id: i64) -> StoreResult<Option<String>> {
        Ok(self
            .state()
            .access
            .get(&(wall_id, user_id))
            .map(|g| g.role.clone()))
    }

    async fn wall_members(&self, wall_id: i64) -> StoreResult<Vec<WallMember>> {
        let state = self.state();
        let mut members: Vec<WallMember> = state
            .access
            .iter()
            .filter(|((w, _), _)| *w == wall_id)
            .filter_map(|((_, user_id), grant)| {
                let user = state.users.iter().find(|u| u.id == *user_id)?;
                Some(WallMember {
                    user_id: *user_id,
                    email: user.email.clone(),
                    name: user.name.clone(),
                    role: grant.role.clone(),
                    created_at: grant.created_at,
                })
            })
            .collect();
        members.sort_by_key(|m| (m.created_at, m.user_id));
        Ok(members)
    }

    async fn grant_access(&self, wall_id: i64, user_id: i64, role: &str) -> StoreResult<()> {
        self.state()
            .access
            .entry((wall_id, user_id))
            .and_modify(|g| g.role = role.to_string())
            .or_insert_with(|| AccessGrant {
                role: role.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn revoke_access(&self, wall_id: i64, user_id: i64) -> StoreResult<bool> {
        Ok(self.state().access.remove(&(wall_id, user_id)).is_some())
    }

    async fn create_invitation(&self, new: NewInvitation) -> StoreResult<Invitation> {
        let mut state = self.state();
        if state.invitations.iter().any(|i| i.token == new.token) {
            return Err(StoreError::Conflict("invitation already exists".into()));
        }
        let invitation = Invitation {
            id: state.id(),
            wall_id: new.wall_id,
            email: new.email,
            role: new.role,
            token: new.token,
            invited_by: new.invited_by,
            accepted_at: None,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        state.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        Ok(self
            .state()
            .invitations
            .iter()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn pending_invitations(&self, wall_id: i64) -> StoreResult<Vec<Invitation>> {
        let mut pending: Vec<Invitation> = self
            .state()
            .invitations
            .iter()
            .filter(|i| i.wall_id == wall_id && i.accepted_at.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pending)
    }

    async fn accept_invitation(&self, invitation_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        match state
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id && i.accepted_at.is_none())
        {
            Some(invitation) => {
                invitation.accepted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_invitation(&self, wall_id: i64, invitation_id: i64) -> StoreResult<bool> {
        let mut state = self.state();
        let before = state.invitations.len();
        state
            .invitations
            .retain(|i| !(i.id == invitation_id && i.wall_id == wall_id));
        Ok(state.invitations.len() != before)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn list_plans(&self) -> StoreResult<Vec<Plan>> {
        let mut plans = self.state().plans.clone();
        plans.sort_by_key(|p| (p.price_cents, p.id));
        Ok(plans)
    }

    async fn plan_by_id(&self, plan_id: i64) -> StoreResult<Option<Plan>> {
        Ok(self.state().plans.iter().find(|p| p.id == plan_id).cloned())
    }

    async fn plan_by_code(&self, code: &str) -> StoreResult<Option<Plan>> {
        Ok(self.state().plans.iter().find(|p| p.code == code).cloned())
    }

    async fn subscription_for_user(&self, user_id: i64) -> StoreResult<Option<Subscription>> {
        Ok(self
            .state()
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<Subscription> {
        let mut state = self.state();
        let now = Utc::now();
        if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.user_id == upsert.user_id)
        {
            existing.plan_id = upsert.plan_id;
            existing.status = upsert.status;
            if upsert.stripe_customer_id.is_some() {
                existing.stripe_customer_id = upsert.stripe_customer_id;
            }
            if upsert.stripe_subscription_id.is_some() {
                existing.stripe_subscription_id = upsert.stripe_subscription_id;
            }
            if upsert.current_period_end.is_some() {
                existing.current_period_end = upsert.current_period_end;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let subscription = Subscription {
            id: state.id(),
            user_id: upsert.user_id,
            plan_id: upsert.plan_id,
            status: upsert.status,
            stripe_customer_id: upsert.stripe_customer_id,
            stripe_subscription_id: upsert.stripe_subscription_id,
            current_period_end: upsert.current_period_end,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut state = self.state();
        let Some(subscription) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
        else {
            return Ok(false);
        };
        subscription.status = status;
        if current_period_end.is_some() {
            subscription.current_period_end = current_period_end;
        }
        subscription.updated_at = Utc::now();
        Ok(true)
    }
}
