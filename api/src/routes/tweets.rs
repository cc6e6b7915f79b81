//! Tweet curation endpoints (/walls/{id}/tweets/*, /walls/{id}/handles/*)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use crate::AppState;
use crate::constants::DEFAULT_PAGE_SIZE;
use crate::domain::handle_queue::HandleQueueEntry;
use crate::domain::tweets::{Tweet, TweetFilter};
use crate::pagination::{Page, PageRequest};
use crate::services::access::{Permission, authorize_wall};
use crate::services::error::ApiError;
use crate::services::ingest;
use crate::services::ordering::{self, Reorder};
use crate::store::{HandleQueueStore, TweetStore};

#[derive(Debug, Serialize)]
pub struct TweetResponse {
    pub id: i64,
    pub wall_id: i64,
    pub external_id: String,
    pub source_url: String,
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    pub author_avatar_url: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub retweets: i64,
    pub tweeted_at: Option<DateTime<Utc>>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Tweet> for TweetResponse {
    fn from(t: Tweet) -> Self {
        Self {
            id: t.id,
            wall_id: t.wall_id,
            external_id: t.external_id,
            source_url: t.source_url,
            content: t.content,
            author_name: t.author_name,
            author_handle: t.author_handle,
            author_avatar_url: t.author_avatar_url,
            likes: t.likes,
            comments: t.comments,
            retweets: t.retweets,
            tweeted_at: t.tweeted_at,
            order_index: t.order_index,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct HandleResponse {
    id: i64,
    handle_url: String,
    processed: bool,
    created_at: DateTime<Utc>,
}

impl From<HandleQueueEntry> for HandleResponse {
    fn from(h: HandleQueueEntry) -> Self {
        Self {
            id: h.id,
            handle_url: h.handle_url,
            processed: h.processed,
            created_at: h.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    created: Vec<TweetResponse>,
    count: usize,
}

impl From<Vec<Tweet>> for ImportResponse {
    fn from(tweets: Vec<Tweet>) -> Self {
        Self {
            count: tweets.len(),
            created: tweets.into_iter().map(TweetResponse::from).collect(),
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/walls/{id}/tweets", get(list_tweets).post(add_tweet))
        .route("/walls/{id}/tweets/order", put(reorder_tweets))
        .route("/walls/{id}/tweets/import/hashtag", post(import_hashtag))
        .route("/walls/{id}/tweets/import/handle", post(import_handle))
        .route("/walls/{id}/tweets/{tweet_id}", delete(delete_tweet))
        .route("/walls/{id}/handles", get(list_handles))
        .route("/walls/{id}/handles/{handle_id}", delete(delete_handle))
}

#[derive(Debug, Default, Deserialize)]
struct TweetListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    search: Option<String>,
    author: Option<String>,
}

impl TweetListQuery {
    fn into_parts(self) -> (TweetFilter, PageRequest) {
        let clean = |s: Option<String>| {
            s.map(|s| s.trim().trim_start_matches('@').to_string())
                .filter(|s| !s.is_empty())
        };
        let page = PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(DEFAULT_PAGE_SIZE));
        let filter = TweetFilter {
            search: self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            author: clean(self.author),
        };
        (filter, page)
    }
}

/// GET /walls/{id}/tweets - Display order, with optional search and author filters
async fn list_tweets(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Query(query): Query<TweetListQuery>,
) -> Result<Json<Page<TweetResponse>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ViewWall).await?;

    let (filter, page) = query.into_parts();
    let tweets = state.store.list_wall_tweets(wall_id, &filter, page).await?;
    Ok(Json(tweets.map(TweetResponse::from)))
}

#[derive(Debug, Deserialize)]
struct AddTweetRequest {
    url: String,
}

/// POST /walls/{id}/tweets - Add a single tweet by its status URL
async fn add_tweet(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<AddTweetRequest>,
) -> Result<(StatusCode, Json<TweetResponse>), ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;

    let tweet =
        ingest::add_tweet_by_url(state.store.as_ref(), state.tweets.as_ref(), &ctx.wall, &req.url)
            .await?;
    Ok((StatusCode::CREATED, Json(tweet.into())))
}

/// DELETE /walls/{id}/tweets/{tweet_id}
async fn delete_tweet(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((wall_id, tweet_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;

    if !state.store.delete_tweet(wall_id, tweet_id).await? {
        return Err(ApiError::not_found("Tweet not found"));
    }
    tracing::info!(wall_id, tweet_id, "tweet removed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    tweet_ids: Option<Vec<i64>>,
    #[serde(default)]
    randomize: bool,
}

impl ReorderRequest {
    /// Randomize wins over any supplied ids
    fn validate(self) -> Result<Reorder, ApiError> {
        if self.randomize {
            return Ok(Reorder::Randomize);
        }
        self.tweet_ids
            .map(Reorder::Explicit)
            .ok_or_else(|| ApiError::bad_request("Provide tweet_ids or randomize"))
    }
}

/// PUT /walls/{id}/tweets/order - Full permutation or shuffle
async fn reorder_tweets(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<TweetResponse>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;
    let request = req.validate()?;

    let tweets = ordering::reorder_wall(state.store.as_ref(), wall_id, request).await?;
    Ok(Json(tweets.into_iter().map(TweetResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct HashtagImportRequest {
    hashtag: String,
}

/// POST /walls/{id}/tweets/import/hashtag
async fn import_hashtag(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<HashtagImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;

    let created =
        ingest::import_hashtag(state.store.as_ref(), state.tweets.as_ref(), &ctx.wall, &req.hashtag)
            .await?;
    Ok(Json(created.into()))
}

#[derive(Debug, Deserialize)]
struct HandleImportRequest {
    handle_url: String,
}

/// POST /walls/{id}/tweets/import/handle - Also queues the handle for the sweep
async fn import_handle(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<HandleImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;

    let created = ingest::import_handle(
        state.store.as_ref(),
        state.tweets.as_ref(),
        &ctx.wall,
        &req.handle_url,
    )
    .await?;
    Ok(Json(created.into()))
}

/// GET /walls/{id}/handles - Handles queued for periodic re-ingestion
async fn list_handles(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<Json<Vec<HandleResponse>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ViewWall).await?;

    let handles = state.store.wall_handles(wall_id).await?;
    Ok(Json(handles.into_iter().map(HandleResponse::from).collect()))
}

/// DELETE /walls/{id}/handles/{handle_id}
async fn delete_handle(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((wall_id, handle_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageTweets).await?;

    if !state.store.remove_handle(wall_id, handle_id).await? {
        return Err(ApiError::not_found("Handle not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_request() {
        let explicit = ReorderRequest {
            tweet_ids: Some(vec![3, 1, 2]),
            randomize: false,
        };
        assert_eq!(explicit.validate().unwrap(), Reorder::Explicit(vec![3, 1, 2]));

        let random = ReorderRequest {
            tweet_ids: Some(vec![3, 1, 2]),
            randomize: true,
        };
        assert_eq!(random.validate().unwrap(), Reorder::Randomize);

        let empty = ReorderRequest {
            tweet_ids: None,
            randomize: false,
        };
        assert!(matches!(empty.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_list_query_parts() {
        let (filter, page) = TweetListQuery {
            page: Some(2),
            limit: Some(1000),
            search: Some("  ".into()),
            author: Some(" @Alice ".into()),
        }
        .into_parts();
        assert!(filter.search.is_none());
        assert_eq!(filter.author.as_deref(), Some("Alice"));
        assert_eq!(page.page, 2);
        assert_eq!(page.limit, crate::constants::MAX_PAGE_SIZE);
    }
}
