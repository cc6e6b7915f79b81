//! Tweet ingestion: single adds, hashtag and handle imports, the handle
//! sweep and the engagement refresh
//!
//! The dedup key is (wall, canonical source URL). Inserts append at the end of
//! the wall's order and nothing here runs in a transaction, so an import that
//! fails half way keeps the tweets it already wrote.

use crate::constants::IMPORT_BATCH_SIZE;
use crate::domain::handle_queue::HandleQueueEntry;
use crate::domain::tweets::{NewTweet, Tweet};
use crate::domain::walls::Wall;
use crate::services::billing::effective_plan;
use crate::services::error::ApiError;
use crate::services::twitter::{
    FetchedTweet, TweetSource, TwitterError, canonical_handle_url, canonical_status_url,
    normalize_hashtag, parse_handle, parse_status_url,
};
use crate::store::{HandleQueueStore, Store, StoreError, TweetStore, WallStore};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Tweet already on wall")]
    Duplicate,
    #[error("Tweet limit reached for this plan")]
    LimitReached,
    #[error(transparent)]
    Twitter(#[from] TwitterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidInput(msg) => ApiError::bad_request(msg),
            IngestError::Duplicate => ApiError::bad_request("Tweet already on wall"),
            IngestError::LimitReached => ApiError::forbidden("Tweet limit reached for this plan"),
            IngestError::Twitter(TwitterError::NotFound(_)) => ApiError::not_found("Tweet not found"),
            IngestError::Twitter(TwitterError::NotConfigured) => {
                ApiError::Unavailable("Twitter integration is not configured".into())
            }
            IngestError::Twitter(e) => {
                tracing::error!(error = %e, "twitter request failed");
                ApiError::internal()
            }
            IngestError::Store(e) => e.into(),
        }
    }
}

/// How many more tweets the wall's owner may put on it
pub async fn remaining_capacity(store: &dyn Store, wall: &Wall) -> Result<usize, StoreError> {
    let Some(plan) = effective_plan(store, wall.owner_id).await? else {
        return Ok(usize::MAX);
    };
    let used = store.count_wall_tweets(wall.id).await?;
    Ok((i64::from(plan.max_tweets_per_wall) - used).max(0) as usize)
}

fn new_tweet(wall_id: i64, fetched: FetchedTweet) -> NewTweet {
    NewTweet {
        wall_id,
        external_id: fetched.external_id,
        source_url: fetched.source_url,
        content: fetched.content,
        author_name: fetched.author_name,
        author_handle: fetched.author_handle,
        author_avatar_url: fetched.author_avatar_url,
        engagement: fetched.engagement,
        tweeted_at: fetched.tweeted_at,
    }
}

/// Add one tweet from a status URL
pub async fn add_tweet_by_url(
    store: &dyn Store,
    source: &dyn TweetSource,
    wall: &Wall,
    url: &str,
) -> Result<Tweet, IngestError> {
    let status = parse_status_url(url).ok_or(IngestError::InvalidInput("Invalid tweet URL"))?;

    // `/i/web/status` links only learn their author from the fetch
    if let Some(handle) = &status.handle {
        let canonical = canonical_status_url(handle, &status.tweet_id);
        if store.source_url_exists(wall.id, &canonical).await? {
            return Err(IngestError::Duplicate);
        }
    }

    if remaining_capacity(store, wall).await? == 0 {
        return Err(IngestError::LimitReached);
    }

    let fetched = source.fetch_tweet(&status.tweet_id).await?;
    if store.source_url_exists(wall.id, &fetched.source_url).await? {
        return Err(IngestError::Duplicate);
    }

    let tweet = store
        .insert_tweet(new_tweet(wall.id, fetched))
        .await?
        .ok_or(IngestError::Duplicate)?;
    tracing::info!(wall_id = wall.id, tweet_id = tweet.id, "tweet added");
    Ok(tweet)
}

/// Insert a fetched batch, skipping duplicates and stopping at the plan limit
async fn insert_batch(
    store: &dyn Store,
    wall: &Wall,
    fetched: Vec<FetchedTweet>,
) -> Result<Vec<Tweet>, IngestError> {
    let mut capacity = remaining_capacity(store, wall).await?;
    let mut created = Vec::new();

    for item in fetched {
        if capacity == 0 {
            tracing::info!(wall_id = wall.id, "plan tweet limit reached, truncating import");
            break;
        }
        if store.source_url_exists(wall.id, &item.source_url).await? {
            continue;
        }
        if let Some(tweet) = store.insert_tweet(new_tweet(wall.id, item)).await? {
            created.push(tweet);
            capacity -= 1;
        }
    }

    Ok(created)
}

/// Import recent tweets carrying a hashtag; returns only new tweets
pub async fn import_hashtag(
    store: &dyn Store,
    source: &dyn TweetSource,
    wall: &Wall,
    hashtag: &str,
) -> Result<Vec<Tweet>, IngestError> {
    let tag = normalize_hashtag(hashtag).ok_or(IngestError::InvalidInput("Invalid hashtag"))?;
    let fetched = source.search_hashtag(&tag, IMPORT_BATCH_SIZE).await?;
    let created = insert_batch(store, wall, fetched).await?;
    tracing::info!(wall_id = wall.id, hashtag = %tag, created = created.len(), "hashtag import");
    Ok(created)
}

async fn ingest_handle(
    store: &dyn Store,
    source: &dyn TweetSource,
    wall: &Wall,
    handle: &str,
) -> Result<Vec<Tweet>, IngestError> {
    let fetched = source.user_tweets(handle, IMPORT_BATCH_SIZE).await?;
    insert_batch(store, wall, fetched).await
}

/// Import a handle's latest tweets and queue the handle for the sweep
pub async fn import_handle(
    store: &dyn Store,
    source: &dyn TweetSource,
    wall: &Wall,
    handle_url: &str,
) -> Result<Vec<Tweet>, IngestError> {
    let handle = parse_handle(handle_url).ok_or(IngestError::InvalidInput("Invalid handle URL"))?;

    if store.enqueue_handle(wall.id, &canonical_handle_url(&handle)).await? {
        tracing::info!(wall_id = wall.id, handle = %handle, "handle queued");
    }

    let created = ingest_handle(store, source, wall, &handle).await?;
    tracing::info!(wall_id = wall.id, handle = %handle, created = created.len(), "handle import");
    Ok(created)
}

/// Result of one handle sweep tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No unprocessed entry was left; `count` entries were reset
    Reset { count: u64 },
    Processed { entry_id: i64, created: usize },
    /// Ingestion failed; the entry stays unprocessed
    Failed { entry_id: i64 },
}

async fn sweep_entry(
    store: &dyn Store,
    source: &dyn TweetSource,
    entry: &HandleQueueEntry,
) -> Result<usize, IngestError> {
    let handle = parse_handle(&entry.handle_url).ok_or(IngestError::InvalidInput("Invalid handle URL"))?;
    let Some(wall) = store.wall_by_id(entry.wall_id).await? else {
        return Ok(0);
    };
    Ok(ingest_handle(store, source, &wall, &handle).await?.len())
}

/// Process at most one queued handle
///
/// Only store errors reading or updating the queue itself propagate; a
/// failed ingestion is logged and reported as [`SweepOutcome::Failed`].
pub async fn poll_next_handle(
    store: &dyn Store,
    source: &dyn TweetSource,
) -> Result<SweepOutcome, StoreError> {
    let Some(entry) = store.oldest_unprocessed_handle().await? else {
        let count = store.reset_handle_queue().await?;
        tracing::info!(count, "handle queue cycle complete, reset");
        return Ok(SweepOutcome::Reset { count });
    };

    match sweep_entry(store, source, &entry).await {
        Ok(created) => {
            store.mark_handle_processed(entry.id).await?;
            tracing::info!(entry_id = entry.id, wall_id = entry.wall_id, created, "handle swept");
            Ok(SweepOutcome::Processed {
                entry_id: entry.id,
                created,
            })
        }
        Err(e) => {
            tracing::warn!(entry_id = entry.id, handle_url = %entry.handle_url, error = %e, "handle sweep failed");
            Ok(SweepOutcome::Failed { entry_id: entry.id })
        }
    }
}

/// Re-read engagement counters for every stored tweet, one at a time
///
/// The first failure aborts the run. Returns the number of tweets updated.
pub async fn refresh_engagement(store: &dyn Store, source: &dyn TweetSource) -> Result<usize, IngestError> {
    let tweets = store.all_tweets().await?;
    let mut updated = 0;
    for tweet in &tweets {
        let fetched = source.fetch_tweet(&tweet.external_id).await?;
        store.update_engagement(tweet.id, fetched.engagement).await?;
        updated += 1;
    }
    Ok(updated)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::domain::tweets::Engagement;
    use crate::services::twitter::{FetchedTweet, TweetSource, TwitterError, canonical_status_url};

    pub fn fetched(handle: &str, id: &str) -> FetchedTweet {
        FetchedTweet {
            external_id: id.to_string(),
            source_url: canonical_status_url(handle, id),
            content: format!("tweet {id} by {handle}"),
            author_name: handle.to_uppercase(),
            author_handle: handle.to_string(),
            author_avatar_url: None,
            engagement: Engagement {
                likes: 1,
                comments: 2,
                retweets: 3,
            },
            tweeted_at: None,
        }
    }

    /// Canned tweet source that records every call
    #[derive(Default)]
    pub struct FakeTweetSource {
        pub tweets: HashMap<String, FetchedTweet>,
        pub by_tag: HashMap<String, Vec<FetchedTweet>>,
        pub by_handle: HashMap<String, Vec<FetchedTweet>>,
        pub fail: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeTweetSource {
        pub fn with_tweet(mut self, tweet: FetchedTweet) -> Self {
            self.tweets.insert(tweet.external_id.clone(), tweet);
            self
        }

        pub fn with_tag(mut self, tag: &str, tweets: Vec<FetchedTweet>) -> Self {
            self.by_tag.insert(tag.to_string(), tweets);
            self
        }

        pub fn with_handle(mut self, handle: &str, tweets: Vec<FetchedTweet>) -> Self {
            self.by_handle.insert(handle.to_string(), tweets);
            self
        }

        fn check(&self) -> Result<(), TwitterError> {
            if self.fail {
                return Err(TwitterError::Api {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TweetSource for FakeTweetSource {
        async fn fetch_tweet(&self, tweet_id: &str) -> Result<FetchedTweet, TwitterError> {
            self.calls.lock().await.push(format!("tweet:{tweet_id}"));
            self.check()?;
            self.tweets
                .get(tweet_id)
                .cloned()
                .ok_or_else(|| TwitterError::NotFound(tweet_id.to_string()))
        }

        async fn search_hashtag(&self, hashtag: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
            self.calls.lock().await.push(format!("tag:{hashtag}"));
            self.check()?;
            let mut out = self.by_tag.get(hashtag).cloned().unwrap_or_default();
            out.truncate(limit as usize);
            Ok(out)
        }

        async fn user_tweets(&self, handle: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
            self.calls.lock().await.push(format!("user:{handle}"));
            self.check()?;
            let mut out = self.by_handle.get(handle).cloned().unwrap_or_default();
            out.truncate(limit as usize);
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeTweetSource, fetched};
    use super::*;
    use crate::domain::users::NewUser;
    use crate::domain::walls::{NewWall, Visibility};
    use crate::store::{BillingStore, MemoryStore, UserStore};

    async fn setup() -> (MemoryStore, Wall) {
        let store = MemoryStore::new();
        let owner = store
            .create_user(NewUser {
                email: "curator@example.com".into(),
                name: "Curator".into(),
                password_hash: None,
                google_id: None,
                email_verified: true,
            })
            .await
            .unwrap();
        let wall = store
            .create_wall(NewWall {
                owner_id: owner.id,
                title: "Love".into(),
                description: None,
                visibility: Visibility::Public,
            })
            .await
            .unwrap();
        (store, wall)
    }

    #[tokio::test]
    async fn test_add_by_url_and_duplicate() {
        let (store, wall) = setup().await;
        let source = FakeTweetSource::default().with_tweet(fetched("alice", "42"));

        let tweet = add_tweet_by_url(&store, &source, &wall, "https://twitter.com/Alice/status/42")
            .await
            .unwrap();
        assert_eq!(tweet.source_url, "https://x.com/alice/status/42");
        assert_eq!(tweet.order_index, 0);

        let err = add_tweet_by_url(&store, &source, &wall, "https://x.com/alice/status/42?s=20")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Duplicate));
        // The pre-check answered without another API call
        assert_eq!(source.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_by_url_errors() {
        let (store, wall) = setup().await;
        let source = FakeTweetSource::default();

        let err = add_tweet_by_url(&store, &source, &wall, "https://example.com/a/status/1")
            .await
            .unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::BadRequest(_)));

        let err = add_tweet_by_url(&store, &source, &wall, "https://x.com/a/status/1")
            .await
            .unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_hashtag_import_dedups() {
        let (store, wall) = setup().await;
        let batch = vec![fetched("a", "1"), fetched("b", "2"), fetched("a", "1")];
        let source = FakeTweetSource::default().with_tag("rustlang", batch);

        let created = import_hashtag(&store, &source, &wall, "#rustlang").await.unwrap();
        assert_eq!(created.len(), 2);

        let again = import_hashtag(&store, &source, &wall, "rustlang").await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.count_wall_tweets(wall.id).await.unwrap(), 2);

        let orders: Vec<i32> = store
            .ordered_wall_tweets(wall.id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.order_index)
            .collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_import_truncated_by_plan() {
        let (store, wall) = setup().await;
        let limit = store.plan_by_code("free").await.unwrap().unwrap().max_tweets_per_wall as usize;
        for i in 0..limit - 5 {
            store
                .insert_tweet(new_tweet(wall.id, fetched("seed", &i.to_string())))
                .await
                .unwrap();
        }
        let batch: Vec<_> = (0..IMPORT_BATCH_SIZE).map(|i| fetched("new", &i.to_string())).collect();
        let source = FakeTweetSource::default().with_tag("big", batch);

        let created = import_hashtag(&store, &source, &wall, "big").await.unwrap();
        assert_eq!(created.len(), 5);
        assert_eq!(store.count_wall_tweets(wall.id).await.unwrap() as usize, limit);

        let err = add_tweet_by_url(&store, &source, &wall, "https://x.com/new/status/99")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::LimitReached));
    }

    #[tokio::test]
    async fn test_handle_import_queues_once() {
        let (store, wall) = setup().await;
        let source = FakeTweetSource::default().with_handle("bob", vec![fetched("bob", "7")]);

        let created = import_handle(&store, &source, &wall, "https://twitter.com/Bob").await.unwrap();
        assert_eq!(created.len(), 1);
        import_handle(&store, &source, &wall, "@bob").await.unwrap();

        let handles = store.wall_handles(wall.id).await.unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].handle_url, "https://x.com/bob");
        assert_eq!(store.count_wall_tweets(wall.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_one_entry_per_tick_then_reset() {
        let (store, wall) = setup().await;
        store.enqueue_handle(wall.id, "https://x.com/a").await.unwrap();
        store.enqueue_handle(wall.id, "https://x.com/b").await.unwrap();
        let source = FakeTweetSource::default()
            .with_handle("a", vec![fetched("a", "1")])
            .with_handle("b", vec![fetched("b", "2"), fetched("b", "3")]);

        let first = poll_next_handle(&store, &source).await.unwrap();
        assert!(matches!(first, SweepOutcome::Processed { created: 1, .. }));
        assert_eq!(store.count_wall_tweets(wall.id).await.unwrap(), 1);

        let second = poll_next_handle(&store, &source).await.unwrap();
        assert!(matches!(second, SweepOutcome::Processed { created: 2, .. }));

        let third = poll_next_handle(&store, &source).await.unwrap();
        assert_eq!(third, SweepOutcome::Reset { count: 2 });
        assert_eq!(store.count_wall_tweets(wall.id).await.unwrap(), 3);
        assert!(store.wall_handles(wall.id).await.unwrap().iter().all(|h| !h.processed));
    }

    #[tokio::test]
    async fn test_failed_sweep_leaves_entry_unprocessed() {
        let (store, wall) = setup().await;
        store.enqueue_handle(wall.id, "https://x.com/a").await.unwrap();
        let source = FakeTweetSource {
            fail: true,
            ..Default::default()
        };

        let outcome = poll_next_handle(&store, &source).await.unwrap();
        assert!(matches!(outcome, SweepOutcome::Failed { .. }));
        let entry = store.oldest_unprocessed_handle().await.unwrap().unwrap();
        assert!(!entry.processed);
    }

    #[tokio::test]
    async fn test_refresh_engagement() {
        let (store, wall) = setup().await;
        let mut tweet = fetched("a", "1");
        let source = FakeTweetSource::default().with_tweet(tweet.clone());
        tweet.engagement = Default::default();
        store.insert_tweet(new_tweet(wall.id, tweet)).await.unwrap();

        assert_eq!(refresh_engagement(&store, &source).await.unwrap(), 1);
        let stored = store.ordered_wall_tweets(wall.id).await.unwrap();
        assert_eq!((stored[0].likes, stored[0].comments, stored[0].retweets), (1, 2, 3));

        let failing = FakeTweetSource {
            fail: true,
            ..Default::default()
        };
        assert!(refresh_engagement(&store, &failing).await.is_err());
    }
}
