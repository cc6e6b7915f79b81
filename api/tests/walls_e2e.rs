//! Router-level flows driven through `oneshot` against the in-memory store

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use wall_of_love::config::Config;
use wall_of_love::domain::tweets::Engagement;
use wall_of_love::services::mailer::{Email, MailError, Mailer};
use wall_of_love::services::session;
use wall_of_love::services::stripe::{StripeClient, sign_payload};
use wall_of_love::services::twitter::{FetchedTweet, TweetSource, TwitterError};
use wall_of_love::storage::MediaStorage;
use wall_of_love::store::{MemoryStore, WallStore};
use wall_of_love::{AppState, build_app};

const WEBHOOK_SECRET: &str = "whsec_e2e";

struct StaticTweets;

#[async_trait]
impl TweetSource for StaticTweets {
    async fn fetch_tweet(&self, tweet_id: &str) -> Result<FetchedTweet, TwitterError> {
        if tweet_id == "404" {
            return Err(TwitterError::NotFound(tweet_id.to_string()));
        }
        Ok(FetchedTweet {
            external_id: tweet_id.to_string(),
            source_url: format!("https://x.com/alice/status/{tweet_id}"),
            content: "Best tool I've used all year".into(),
            author_name: "Alice".into(),
            author_handle: "alice".into(),
            author_avatar_url: None,
            engagement: Engagement {
                likes: 12,
                comments: 1,
                retweets: 3,
            },
            tweeted_at: None,
        })
    }

    async fn search_hashtag(&self, _hashtag: &str, _limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
        Ok(Vec::new())
    }

    async fn user_tweets(&self, _handle: &str, _limit: u8) -> Result<Vec<FetchedTweet>, TwitterError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().await.push(email);
        Ok(())
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    mailer: Arc<RecordingMailer>,
    _media: tempfile::TempDir,
}

fn harness() -> Harness {
    let media = tempfile::tempdir().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("STORE_BACKEND", "memory".to_string()),
        ("JWT_COOKIE_SECRET", "cookie-secret".to_string()),
        ("JWT_BEARER_SECRET", "bearer-secret".to_string()),
        ("FRONTEND_URL", "http://app.test".to_string()),
        ("STRIPE_SECRET_KEY", "sk_test".to_string()),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET.to_string()),
        ("LOCAL_STORAGE_PATH", media.path().display().to_string()),
    ]);
    let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let state = Arc::new(AppState {
        store: Arc::new(MemoryStore::new()),
        tweets: Arc::new(StaticTweets),
        mailer: mailer.clone(),
        media: MediaStorage::Local(media.path().to_path_buf()),
        stripe: config.stripe.as_ref().map(StripeClient::new),
        google: None,
        config: Arc::new(config),
    });

    Harness {
        app: build_app(state.clone()),
        state,
        mailer,
        _media: media,
    }
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.7");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value, Vec<String>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
        .collect();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body, cookies)
}

fn token_from_mail(email: &Email) -> String {
    email
        .body
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string()
}

/// Sign up, verify through the mailed token, log in; returns the access cookie
async fn signed_in(h: &Harness) -> String {
    let (status, _, _) = send(
        &h.app,
        request(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "owner@example.com", "password": "correct horse", "name": "Owner"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = send(
        &h.app,
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "owner@example.com", "password": "correct horse"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = token_from_mail(&h.mailer.sent.lock().await[0]);
    let (status, _, _) = send(
        &h.app,
        request(Method::POST, "/api/auth/verify-email", None, Some(json!({"token": token}))),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, cookies) = send(
        &h.app,
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "Owner@Example.com", "password": "correct horse"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    cookies
        .into_iter()
        .find(|c| c.starts_with("access_token="))
        .unwrap()
}

#[tokio::test]
async fn test_wall_tweet_lifecycle() {
    let h = harness();
    let cookie = signed_in(&h).await;

    let (status, wall, _) = send(
        &h.app,
        request(Method::POST, "/api/walls", Some(&cookie), Some(json!({"title": "Customers"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let wall_id = wall["id"].as_i64().unwrap();

    let tweets_uri = format!("/api/walls/{wall_id}/tweets");
    let (status, tweet, _) = send(
        &h.app,
        request(
            Method::POST,
            &tweets_uri,
            Some(&cookie),
            Some(json!({"url": "https://twitter.com/alice/status/111"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tweet["source_url"], "https://x.com/alice/status/111");
    let tweet_id = tweet["id"].as_i64().unwrap();

    let (status, body, _) = send(
        &h.app,
        request(
            Method::POST,
            &tweets_uri,
            Some(&cookie),
            Some(json!({"url": "https://x.com/alice/status/111"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Tweet already on wall");

    let (status, page, _) = send(&h.app, request(Method::GET, &tweets_uri, Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], tweet_id);

    let (status, _, _) = send(
        &h.app,
        request(Method::DELETE, &format!("{tweets_uri}/{tweet_id}"), Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, page, _) = send(&h.app, request(Method::GET, &tweets_uri, Some(&cookie), None)).await;
    assert_eq!(page["total"], 0);
    assert_eq!(page["items"], json!([]));
}

#[tokio::test]
async fn test_error_body_shape() {
    let h = harness();
    let cookie = signed_in(&h).await;

    let (status, body, _) = send(&h.app, request(Method::GET, "/api/walls/9999", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/api/walls/9999");
    assert!(body["message"].is_string());

    let (status, body, _) = send(&h.app, request(Method::GET, "/api/walls", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["path"], "/api/walls");
}

#[tokio::test]
async fn test_cookie_jwt_rejected_as_bearer() {
    let h = harness();
    let cookie = signed_in(&h).await;
    let cookie_jwt = cookie.trim_start_matches("access_token=").to_string();

    let mut req = request(Method::GET, "/api/users/me", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {cookie_jwt}").parse().unwrap(),
    );
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body, _) = send(&h.app, request(Method::POST, "/api/auth/token", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    let api_token = body["api_token"].as_str().unwrap();
    assert!(session::validate_token(api_token, b"bearer-secret").is_ok());

    let mut req = request(Method::GET, "/api/users/me", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {api_token}").parse().unwrap(),
    );
    let (status, me, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "owner@example.com");
}

#[tokio::test]
async fn test_stripe_webhook_signature() {
    let h = harness();
    let payload = json!({
        "id": "evt_1",
        "type": "invoice.payment_failed",
        "data": {"object": {"subscription": "sub_missing"}}
    })
    .to_string();

    let webhook = |signature: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/subscriptions/webhook")
            .header("stripe-signature", signature)
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let now = chrono::Utc::now().timestamp();
    let forged = sign_payload(payload.as_bytes(), "whsec_other", now);
    let (status, body, _) = send(&h.app, webhook(forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid signature");

    let signed = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, now);
    let (status, body, _) = send(&h.app, webhook(signed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn test_public_wall_visibility() {
    let h = harness();
    let cookie = signed_in(&h).await;

    let (_, wall, _) = send(
        &h.app,
        request(Method::POST, "/api/walls", Some(&cookie), Some(json!({"title": "Fans"}))),
    )
    .await;
    let public_uri = format!("/api/public/walls/{}", wall["id"]);

    let (status, _, _) = send(&h.app, request(Method::GET, &public_uri, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &h.app,
        request(
            Method::PATCH,
            &format!("/api/walls/{}", wall["id"]),
            Some(&cookie),
            Some(json!({"visibility": "public"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(&h.app, request(Method::GET, &public_uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Fans");
    let owner_id = wall["owner_id"].as_i64().unwrap();
    assert_eq!(h.state.store.count_owned_walls(owner_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_add_unknown_tweet() {
    let h = harness();
    let cookie = signed_in(&h).await;

    let (_, wall, _) = send(
        &h.app,
        request(Method::POST, "/api/walls", Some(&cookie), Some(json!({"title": "Missing"}))),
    )
    .await;
    let (status, body, _) = send(
        &h.app,
        request(
            Method::POST,
            &format!("/api/walls/{}/tweets", wall["id"]),
            Some(&cookie),
            Some(json!({"url": "https://x.com/alice/status/404"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Tweet not found");
}
