//! Tweet domain - curated tweets on a wall
//!
//! Display order within a wall is `order_index` ascending. New tweets are
//! appended after the current maximum; only a reorder compacts the indexes.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::pagination::PageRequest;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tweet {
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

/// A tweet about to be attached to a wall
#[derive(Debug, Clone)]
pub struct NewTweet {
    pub wall_id: i64,
    pub external_id: String,
    pub source_url: String,
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    pub author_avatar_url: Option<String>,
    pub engagement: Engagement,
    pub tweeted_at: Option<DateTime<Utc>>,
}

/// Engagement counters refreshed from the Twitter API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub likes: i64,
    pub comments: i64,
    pub retweets: i64,
}

/// Optional list filters (case-insensitive substring match)
#[derive(Debug, Clone, Default)]
pub struct TweetFilter {
    /// Matches content or author name
    pub search: Option<String>,
    /// Matches author handle
    pub author: Option<String>,
}

const TWEET_COLUMNS: &str = "id, wall_id, external_id, source_url, content, author_name, \
    author_handle, author_avatar_url, likes, comments, retweets, tweeted_at, order_index, created_at";

// Literal substring match; `%` and `_` in user input carry no pattern meaning
const FILTER_WHERE: &str = r#"
    AND ($2::TEXT IS NULL
         OR strpos(lower(content), lower($2)) > 0
         OR strpos(lower(author_name), lower($2)) > 0)
    AND ($3::TEXT IS NULL OR strpos(lower(author_handle), lower($3)) > 0)
"#;

pub async fn count_wall_tweets<'e, E>(executor: E, wall_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tweets WHERE wall_id = $1")
        .bind(wall_id)
        .fetch_one(executor)
        .await?;
    Ok(count)
}

/// Tweet ids of a wall in display order
pub async fn list_wall_tweet_ids<'e, E>(executor: E, wall_id: i64) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM tweets WHERE wall_id = $1 ORDER BY order_index, id")
            .bind(wall_id)
            .fetch_all(executor)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn list_ordered_wall_tweets<'e, E>(
    executor: E,
    wall_id: i64,
) -> Result<Vec<Tweet>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query =
        format!("SELECT {TWEET_COLUMNS} FROM tweets WHERE wall_id = $1 ORDER BY order_index, id");
    sqlx::query_as(&query)
        .bind(wall_id)
        .fetch_all(executor)
        .await
}

pub async fn count_filtered_wall_tweets<'e, E>(
    executor: E,
    wall_id: i64,
    filter: &TweetFilter,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT COUNT(*) FROM tweets WHERE wall_id = $1 {FILTER_WHERE}");
    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(wall_id)
        .bind(&filter.search)
        .bind(&filter.author)
        .fetch_one(executor)
        .await?;
    Ok(count)
}

pub async fn list_wall_tweets_paginated<'e, E>(
    executor: E,
    wall_id: i64,
    filter: &TweetFilter,
    page: PageRequest,
) -> Result<Vec<Tweet>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"SELECT {TWEET_COLUMNS} FROM tweets
           WHERE wall_id = $1 {FILTER_WHERE}
           ORDER BY order_index, id
           LIMIT $4 OFFSET $5"#
    );
    sqlx::query_as(&query)
        .bind(wall_id)
        .bind(&filter.search)
        .bind(&filter.author)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(executor)
        .await
}

pub async fn get_tweet<'e, E>(
    executor: E,
    wall_id: i64,
    tweet_id: i64,
) -> Result<Option<Tweet>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {TWEET_COLUMNS} FROM tweets WHERE id = $1 AND wall_id = $2");
    sqlx::query_as(&query)
        .bind(tweet_id)
        .bind(wall_id)
        .fetch_optional(executor)
        .await
}

pub async fn source_url_exists<'e, E>(
    executor: E,
    wall_id: i64,
    source_url: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM tweets WHERE wall_id = $1 AND source_url = $2)",
    )
    .bind(wall_id)
    .bind(source_url)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

/// Append a tweet at the end of the wall's order.
/// Returns None when (wall_id, source_url) already exists.
pub async fn insert_tweet<'e, E>(executor: E, new: &NewTweet) -> Result<Option<Tweet>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO tweets (wall_id, external_id, source_url, content, author_name, author_handle,
                            author_avatar_url, likes, comments, retweets, tweeted_at, order_index)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                (SELECT COALESCE(MAX(order_index) + 1, 0) FROM tweets WHERE wall_id = $1))
        ON CONFLICT (wall_id, source_url) DO NOTHING
        RETURNING {TWEET_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(new.wall_id)
        .bind(&new.external_id)
        .bind(&new.source_url)
        .bind(&new.content)
        .bind(&new.author_name)
        .bind(&new.author_handle)
        .bind(&new.author_avatar_url)
        .bind(new.engagement.likes)
        .bind(new.engagement.comments)
        .bind(new.engagement.retweets)
        .bind(new.tweeted_at)
        .fetch_optional(executor)
        .await
}

pub async fn delete_tweet<'e, E>(executor: E, wall_id: i64, tweet_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM tweets WHERE id = $1 AND wall_id = $2")
        .bind(tweet_id)
        .bind(wall_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_order_index<'e, E>(
    executor: E,
    wall_id: i64,
    tweet_id: i64,
    order_index: i32,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE tweets SET order_index = $3 WHERE id = $1 AND wall_id = $2")
        .bind(tweet_id)
        .bind(wall_id)
        .bind(order_index)
        .execute(executor)
        .await?;
    Ok(())
}

/// Every tweet across all walls, for the engagement refresh
pub async fn list_all_tweets<'e, E>(executor: E) -> Result<Vec<Tweet>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {TWEET_COLUMNS} FROM tweets ORDER BY id");
    sqlx::query_as(&query).fetch_all(executor).await
}

pub async fn update_engagement<'e, E>(
    executor: E,
    tweet_id: i64,
    engagement: Engagement,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE tweets SET likes = $2, comments = $3, retweets = $4 WHERE id = $1")
        .bind(tweet_id)
        .bind(engagement.likes)
        .bind(engagement.comments)
        .bind(engagement.retweets)
        .execute(executor)
        .await?;
    Ok(())
}
