//! The friends feed: a fan-in over the rating partitions of the caller and
//! every friend, merged newest first.
//!
//! There is no materialized feed. Each request queries one page per source
//! partition concurrently, merges by creation time, and cuts the page. The
//! cursor is the `createdAt` of the last returned rating; the next request
//! ranges each partition strictly below it.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};

use crate::config::PhotoConfig;
use crate::error::AppResult;
use crate::infrastructure::store::{field_str, Item, ItemKey, ItemStore, QuerySpec};
use crate::keyspace;
use crate::services::projector;

pub struct FeedPage {
    pub ratings: Vec<Item>,
    pub liked_rating_ids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// One feed source: a user partition plus the identity attached to every
/// rating projected from it.
struct FeedSource {
    user_id: String,
    username: String,
    display_name: String,
}

pub struct FeedService {
    store: Arc<dyn ItemStore>,
}

impl FeedService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    async fn sources(&self, user_id: &str) -> AppResult<Vec<FeedSource>> {
        let friends = self
            .store
            .query(
                QuerySpec::partition(keyspace::user_pk(user_id))
                    .prefix(keyspace::FRIEND_PREFIX),
            )
            .await?;

        let mut sources: Vec<FeedSource> = friends
            .items
            .iter()
            .filter_map(|edge| {
                Some(FeedSource {
                    user_id: field_str(edge, "friendUserId")?.to_string(),
                    username: field_str(edge, "friendUsername")
                        .unwrap_or_default()
                        .to_string(),
                    display_name: field_str(edge, "friendDisplayName")
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect();

        // The caller's own ratings appear in their feed too.
        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?;
        sources.push(FeedSource {
            user_id: user_id.to_string(),
            username: profile
                .as_ref()
                .and_then(|p| field_str(p, "username"))
                .unwrap_or_default()
                .to_string(),
            display_name: profile
                .as_ref()
                .and_then(|p| field_str(p, "displayName"))
                .unwrap_or_default()
                .to_string(),
        });

        Ok(sources)
    }

    pub async fn feed(
        &self,
        user_id: &str,
        photos: &PhotoConfig,
        limit: u32,
        cursor: Option<&str>,
    ) -> AppResult<FeedPage> {
        let sources = self.sources(user_id).await?;

        let queries = sources.iter().map(|source| {
            let spec = match cursor {
                // The end bound "RATING#<cursor>" sorts before every real
                // sort key with that timestamp, so the boundary item itself
                // is excluded.
                Some(cursor) => QuerySpec::partition(keyspace::user_pk(&source.user_id))
                    .between(
                        keyspace::RATING_PREFIX,
                        format!("{}{}", keyspace::RATING_PREFIX, cursor),
                    ),
                None => QuerySpec::partition(keyspace::user_pk(&source.user_id))
                    .prefix(keyspace::RATING_PREFIX),
            };
            // One extra row per source so "more items remain" is decidable
            // after the merge.
            self.store.query(spec.newest_first().limit(limit + 1))
        });
        let pages = join_all(queries).await;

        let mut all: Vec<Item> = Vec::new();
        for (source, page) in sources.iter().zip(pages) {
            for item in page?.items {
                let mut projected = projector::project_rating(&item, photos);
                projected.insert("username".to_string(), Value::String(source.username.clone()));
                projected.insert(
                    "displayName".to_string(),
                    Value::String(source.display_name.clone()),
                );
                all.push(projected);
            }
        }

        all.sort_by(|a, b| {
            let a_at = field_str(a, "createdAt").unwrap_or_default();
            let b_at = field_str(b, "createdAt").unwrap_or_default();
            b_at.cmp(a_at)
        });

        let has_more = all.len() > limit as usize;
        all.truncate(limit as usize);

        let next_cursor = if has_more {
            all.last()
                .and_then(|item| field_str(item, "createdAt"))
                .map(str::to_string)
        } else {
            None
        };

        let ids: Vec<String> = all
            .iter()
            .filter_map(|item| field_str(item, "ratingId"))
            .map(str::to_string)
            .collect();
        let liked = projector::liked_rating_ids(self.store.as_ref(), &ids, Some(user_id)).await?;

        Ok(FeedPage {
            ratings: all,
            liked_rating_ids: liked,
            next_cursor,
        })
    }
}

/// Response body shape shared by the feed route.
pub fn feed_body(page: &FeedPage) -> Value {
    json!({
        "ratings": page.ratings,
        "likedRatingIds": page.liked_rating_ids,
        "nextCursor": page.next_cursor,
    })
}
