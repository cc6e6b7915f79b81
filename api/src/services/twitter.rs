//! Twitter API v2 read client and tweet URL handling
//!
//! Only app-level (bearer token) reads are needed: single tweet lookup,
//! recent search by hashtag and a user's timeline. [`TweetSource`] is the seam
//! the ingestion code and jobs depend on so tests can swap in a fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::domain::tweets::Engagement;

const API_BASE: &str = "https://api.x.com";
const TWEET_FIELDS: &str = "public_metrics,created_at,author_id";
const USER_FIELDS: &str = "name,username,profile_image_url";
/// The search and timeline endpoints refuse smaller pages
const MIN_API_PAGE: u8 = 10;

#[derive(Debug, thiserror::Error)]
pub enum TwitterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Twitter API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("Twitter API is not configured")]
    NotConfigured,
}

/// A tweet as read from the API, already carrying its canonical URL
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTweet {
    pub external_id: String,
    pub source_url: String,
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    pub author_avatar_url: Option<String>,
    pub engagement: Engagement,
    pub tweeted_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TweetSource: Send + Sync {
    async fn fetch_tweet(&self, tweet_id: &str) -> Result<FetchedTweet, TwitterError>;
    /// Recent original tweets carrying `#hashtag` (given without the `#`)
    async fn search_hashtag(&self, hashtag: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError>;
    async fn user_tweets(&self, handle: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError>;
}

#[derive(Clone)]
pub struct TwitterClient {
    bearer_token: Option<String>,
    base_url: String,
    http: Client,
}

impl TwitterClient {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self::with_base_url(bearer_token, API_BASE)
    }

    pub fn with_base_url(bearer_token: Option<String>, base_url: &str) -> Self {
        Self {
            bearer_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TwitterError> {
        let token = self.bearer_token.as_ref().ok_or(TwitterError::NotConfigured)?;

        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TwitterError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(TwitterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }

    fn expansion_query() -> Vec<(&'static str, String)> {
        vec![
            ("expansions", "author_id".to_string()),
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("user.fields", USER_FIELDS.to_string()),
        ]
    }
}

#[async_trait]
impl TweetSource for TwitterClient {
    async fn fetch_tweet(&self, tweet_id: &str) -> Result<FetchedTweet, TwitterError> {
        let path = format!("/2/tweets/{}", percent_encode(tweet_id));
        let resp: SingleTweetResponse = self.get(&path, &Self::expansion_query()).await?;

        let data = resp
            .data
            .ok_or_else(|| TwitterError::NotFound(format!("tweet {tweet_id}")))?;
        let users = resp.includes.map(|i| i.users).unwrap_or_default();
        to_fetched(data, &users).ok_or_else(|| TwitterError::NotFound(format!("author of tweet {tweet_id}")))
    }

    async fn search_hashtag(&self, hashtag: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
        let mut query = Self::expansion_query();
        query.push(("query", format!("#{hashtag} -is:retweet")));
        query.push(("max_results", limit.max(MIN_API_PAGE).to_string()));

        let resp: TweetListResponse = self.get("/2/tweets/search/recent", &query).await?;
        Ok(resp.into_fetched(limit))
    }

    async fn user_tweets(&self, handle: &str, limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
        let path = format!("/2/users/by/username/{}", percent_encode(handle));
        let user: UserLookupResponse = self.get(&path, &[]).await?;
        let user = user
            .data
            .ok_or_else(|| TwitterError::NotFound(format!("user {handle}")))?;

        let mut query = Self::expansion_query();
        query.push(("exclude", "retweets,replies".to_string()));
        query.push(("max_results", limit.max(MIN_API_PAGE).to_string()));

        let path = format!("/2/users/{}/tweets", percent_encode(&user.id));
        let resp: TweetListResponse = self.get(&path, &query).await?;
        Ok(resp.into_fetched(limit))
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

// ============================================================================
// API response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct SingleTweetResponse {
    data: Option<ApiTweet>,
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct TweetListResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    includes: Option<Includes>,
}

impl TweetListResponse {
    fn into_fetched(self, limit: u8) -> Vec<FetchedTweet> {
        let users = self.includes.map(|i| i.users).unwrap_or_default();
        self.data
            .into_iter()
            .filter_map(|t| to_fetched(t, &users))
            .take(limit as usize)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    public_metrics: Option<PublicTweetMetrics>,
}

#[derive(Debug, Deserialize)]
struct PublicTweetMetrics {
    retweet_count: i64,
    reply_count: i64,
    like_count: i64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    name: String,
    username: String,
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<ApiUser>,
}

fn to_fetched(tweet: ApiTweet, users: &[ApiUser]) -> Option<FetchedTweet> {
    let author_id = tweet.author_id.as_deref()?;
    let author = users.iter().find(|u| u.id == author_id)?;
    let engagement = tweet
        .public_metrics
        .map(|m| Engagement {
            likes: m.like_count,
            comments: m.reply_count,
            retweets: m.retweet_count,
        })
        .unwrap_or_default();

    Some(FetchedTweet {
        source_url: canonical_status_url(&author.username, &tweet.id),
        external_id: tweet.id,
        content: tweet.text,
        author_name: author.name.clone(),
        author_handle: author.username.clone(),
        author_avatar_url: author.profile_image_url.clone(),
        engagement,
        tweeted_at: tweet.created_at,
    })
}

// ============================================================================
// URL parsing and canonical forms
// ============================================================================

const TWITTER_HOSTS: &[&str] = &[
    "x.com",
    "www.x.com",
    "mobile.x.com",
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
];

/// First path segments that are site pages, not accounts
const RESERVED_PATHS: &[&str] = &[
    "home", "i", "search", "explore", "hashtag", "settings", "messages", "notifications", "intent",
];

/// A tweet reference pulled out of a status URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRef {
    /// None for `/i/web/status/<id>` links
    pub handle: Option<String>,
    pub tweet_id: String,
}

fn parse_twitter_url(input: &str) -> Option<Url> {
    let input = input.trim();
    let url = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("https://{input}")).ok()?
    };
    let host = url.host_str()?.to_ascii_lowercase();
    TWITTER_HOSTS.contains(&host.as_str()).then_some(url)
}

fn is_valid_handle(handle: &str) -> bool {
    (1..=15).contains(&handle.len())
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `https://(x|twitter).com/<handle>/status/<id>` and its variants
pub fn parse_status_url(input: &str) -> Option<StatusRef> {
    let url = parse_twitter_url(input)?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    let (handle, id) = match segments.as_slice() {
        ["i", "web", "status", id, ..] => (None, *id),
        [handle, "status" | "statuses", id, ..] if is_valid_handle(handle) => {
            (Some(handle.to_ascii_lowercase()), *id)
        }
        _ => return None,
    };

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(StatusRef {
        handle,
        tweet_id: id.to_string(),
    })
}

/// Accept a profile URL, `@handle` or a bare handle
pub fn parse_handle(input: &str) -> Option<String> {
    let input = input.trim();
    let candidate = if let Some(h) = input.strip_prefix('@') {
        h.to_string()
    } else if input.contains('/') || input.contains('.') {
        let url = parse_twitter_url(input)?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let first = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        first.to_string()
    } else {
        input.to_string()
    };

    let lower = candidate.to_ascii_lowercase();
    if !is_valid_handle(&candidate) || RESERVED_PATHS.contains(&lower.as_str()) {
        return None;
    }
    Some(lower)
}

/// Strip an optional leading `#` and validate the tag
pub fn normalize_hashtag(input: &str) -> Option<String> {
    let tag = input.trim();
    let tag = tag.strip_prefix('#').unwrap_or(tag);
    if tag.is_empty() || tag.len() > 100 || !tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(tag.to_string())
}

pub fn canonical_status_url(handle: &str, tweet_id: &str) -> String {
    format!("https://x.com/{}/status/{}", handle.to_ascii_lowercase(), tweet_id)
}

pub fn canonical_handle_url(handle: &str) -> String {
    format!("https://x.com/{}", handle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_url_variants() {
        let expected = StatusRef {
            handle: Some("jack".into()),
            tweet_id: "20".into(),
        };
        for url in [
            "https://twitter.com/jack/status/20",
            "https://x.com/Jack/status/20",
            "http://mobile.twitter.com/jack/status/20?s=21",
            "x.com/jack/status/20/photo/1",
            "https://www.x.com/jack/statuses/20",
        ] {
            assert_eq!(parse_status_url(url), Some(expected.clone()), "{url}");
        }

        assert_eq!(
            parse_status_url("https://x.com/i/web/status/123"),
            Some(StatusRef {
                handle: None,
                tweet_id: "123".into()
            })
        );
    }

    #[test]
    fn test_parse_status_url_rejects() {
        assert!(parse_status_url("https://example.com/jack/status/20").is_none());
        assert!(parse_status_url("https://x.com/jack").is_none());
        assert!(parse_status_url("https://x.com/jack/status/abc").is_none());
        assert!(parse_status_url("not a url at all").is_none());
    }

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("https://twitter.com/Rustlang").as_deref(), Some("rustlang"));
        assert_eq!(parse_handle("x.com/rustlang/").as_deref(), Some("rustlang"));
        assert_eq!(parse_handle("@rustlang").as_deref(), Some("rustlang"));
        assert_eq!(parse_handle("rustlang").as_deref(), Some("rustlang"));
        assert!(parse_handle("https://x.com/rustlang/status/1").is_none());
        assert!(parse_handle("https://x.com/home").is_none());
        assert!(parse_handle("https://example.com/rustlang").is_none());
        assert!(parse_handle("way_too_long_for_a_handle").is_none());
    }

    #[test]
    fn test_canonical_forms_dedup_across_hosts() {
        let a = parse_status_url("https://twitter.com/Jack/status/20").unwrap();
        let b = parse_status_url("https://mobile.x.com/jack/status/20").unwrap();
        assert_eq!(
            canonical_status_url(a.handle.as_deref().unwrap(), &a.tweet_id),
            canonical_status_url(b.handle.as_deref().unwrap(), &b.tweet_id),
        );
        assert_eq!(canonical_handle_url("RustLang"), "https://x.com/rustlang");
    }

    #[test]
    fn test_normalize_hashtag() {
        assert_eq!(normalize_hashtag("#rustlang").as_deref(), Some("rustlang"));
        assert_eq!(normalize_hashtag(" rust_lang ").as_deref(), Some("rust_lang"));
        assert!(normalize_hashtag("#").is_none());
        assert!(normalize_hashtag("two words").is_none());
    }

    #[test]
    fn test_list_response_mapping() {
        let json = serde_json::json!({
            "data": [
                {
                    "id": "1",
                    "text": "love this",
                    "author_id": "u1",
                    "created_at": "2025-01-02T03:04:05.000Z",
                    "public_metrics": {"retweet_count": 3, "reply_count": 2, "like_count": 10, "quote_count": 0}
                },
                {"id": "2", "text": "orphan", "author_id": "missing"},
                {"id": "3", "text": "again", "author_id": "u1"}
            ],
            "includes": {"users": [
                {"id": "u1", "name": "Fan", "username": "TheFan", "profile_image_url": "https://pbs.example/a.jpg"}
            ]}
        });
        let resp: TweetListResponse = serde_json::from_value(json).unwrap();
        let tweets = resp.into_fetched(10);

        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].source_url, "https://x.com/thefan/status/1");
        assert_eq!(tweets[0].author_handle, "TheFan");
        assert_eq!(
            tweets[0].engagement,
            Engagement {
                likes: 10,
                comments: 2,
                retweets: 3
            }
        );
        assert!(tweets[0].tweeted_at.is_some());
        assert_eq!(tweets[1].engagement, Engagement::default());
    }

    #[test]
    fn test_list_response_truncates_to_limit() {
        let json = serde_json::json!({
            "data": (0..12).map(|i| serde_json::json!({"id": i.to_string(), "text": "t", "author_id": "u"})).collect::<Vec<_>>(),
            "includes": {"users": [{"id": "u", "name": "U", "username": "u"}]}
        });
        let resp: TweetListResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.into_fetched(10).len(), 10);
    }

    #[tokio::test]
    async fn test_unconfigured_client_errors() {
        let client = TwitterClient::new(None);
        assert!(matches!(
            client.fetch_tweet("1").await,
            Err(TwitterError::NotConfigured)
        ));
    }
}
