//! Manual and randomized tweet ordering within a wall
//!
//! A reorder writes `order_index` 0..n-1 row by row without a transaction.
//! A failure part way through leaves a mixed order, and concurrent reorders
//! race with the last write per row winning.

use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::domain::tweets::Tweet;
use crate::services::error::ApiError;
use crate::store::{Store, TweetStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reorder {
    /// A full permutation of the wall's tweet ids
    Explicit(Vec<i64>),
    /// Uniform shuffle of the current ids
    Randomize,
}

/// Check that `proposed` is a permutation of `current`
pub fn validate_permutation(current: &[i64], proposed: &[i64]) -> Result<(), ApiError> {
    let invalid = || ApiError::bad_request("Invalid tweet order");

    if proposed.len() != current.len() {
        return Err(invalid());
    }
    let known: HashSet<i64> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !known.contains(id) || !seen.insert(*id) {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Fisher-Yates shuffle of `ids`
pub fn shuffled(ids: &[i64]) -> Vec<i64> {
    let mut out = ids.to_vec();
    // ThreadRng is not Send; this stays outside any await
    out.shuffle(&mut rand::rng());
    out
}

/// Apply a reorder and return the wall's tweets in their new order
pub async fn reorder_wall(store: &dyn Store, wall_id: i64, request: Reorder) -> Result<Vec<Tweet>, ApiError> {
    let current = store.wall_tweet_ids(wall_id).await?;

    let order = match request {
        Reorder::Explicit(ids) => {
            validate_permutation(&current, &ids)?;
            ids
        }
        Reorder::Randomize => shuffled(&current),
    };

    for (index, tweet_id) in order.iter().enumerate() {
        store.set_order_index(wall_id, *tweet_id, index as i32).await?;
    }

    tracing::info!(wall_id, tweets = order.len(), "wall reordered");
    Ok(store.ordered_wall_tweets(wall_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tweets::{Engagement, NewTweet};
    use crate::domain::users::NewUser;
    use crate::domain::walls::{NewWall, Visibility};
    use crate::store::{MemoryStore, UserStore, WallStore};

    async fn wall_with_tweets(n: i64) -> (MemoryStore, i64, Vec<i64>) {
        let store = MemoryStore::new();
        let owner = store
            .create_user(NewUser {
                email: "o@example.com".into(),
                name: "O".into(),
                password_hash: None,
                google_id: None,
                email_verified: true,
            })
            .await
            .unwrap();
        let wall = store
            .create_wall(NewWall {
                owner_id: owner.id,
                title: "W".into(),
                description: None,
                visibility: Visibility::Public,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let tweet = store
                .insert_tweet(NewTweet {
                    wall_id: wall.id,
                    external_id: i.to_string(),
                    source_url: format!("https://x.com/a/status/{i}"),
                    content: "c".into(),
                    author_name: "A".into(),
                    author_handle: "a".into(),
                    author_avatar_url: None,
                    engagement: Engagement::default(),
                    tweeted_at: None,
                })
                .await
                .unwrap()
                .unwrap();
            ids.push(tweet.id);
        }
        (store, wall.id, ids)
    }

    #[test]
    fn test_validate_permutation() {
        let current = [1, 2, 3];
        assert!(validate_permutation(&current, &[3, 1, 2]).is_ok());
        assert!(validate_permutation(&current, &[1, 2]).is_err());
        assert!(validate_permutation(&current, &[1, 2, 2]).is_err());
        assert!(validate_permutation(&current, &[1, 2, 9]).is_err());
        assert!(validate_permutation(&[], &[]).is_ok());
    }

    #[test]
    fn test_shuffled_is_permutation() {
        let ids: Vec<i64> = (0..20).collect();
        let out = shuffled(&ids);
        assert!(validate_permutation(&ids, &out).is_ok());
    }

    #[tokio::test]
    async fn test_explicit_reorder_compacts_indexes() {
        let (store, wall, ids) = wall_with_tweets(4).await;
        let wanted = vec![ids[2], ids[0], ids[3], ids[1]];

        let tweets = reorder_wall(&store, wall, Reorder::Explicit(wanted.clone()))
            .await
            .unwrap();

        assert_eq!(tweets.iter().map(|t| t.id).collect::<Vec<_>>(), wanted);
        assert_eq!(
            tweets.iter().map(|t| t.order_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_wrong_length_rejected_without_writes() {
        let (store, wall, ids) = wall_with_tweets(3).await;
        let err = reorder_wall(&store, wall, Reorder::Explicit(vec![ids[1], ids[0]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Invalid tweet order"));
        assert_eq!(store.wall_tweet_ids(wall).await.unwrap(), ids);
    }

    #[tokio::test]
    async fn test_randomize_changes_order_eventually() {
        let (store, wall, ids) = wall_with_tweets(6).await;
        let mut changed = false;
        for _ in 0..20 {
            let tweets = reorder_wall(&store, wall, Reorder::Randomize).await.unwrap();
            let order: Vec<i64> = tweets.iter().map(|t| t.id).collect();
            assert!(validate_permutation(&ids, &order).is_ok());
            if order != ids {
                changed = true;
                break;
            }
        }
        assert!(changed);
    }
}
