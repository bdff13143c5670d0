//! Social writes: likes, comments, friend edges.
//!
//! Like and comment counters live on three items (the rating META plus both
//! rating copies) and are adjusted with commutative ADD-deltas, never
//! read-modify-write, so concurrent reactions from different users cannot
//! lose updates.

use std::sync::Arc;

use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    field_i64, field_str, Item, ItemKey, ItemStore, QuerySpec, UpdateSpec,
};
use crate::keyspace;
use crate::services::projector;

const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone)]
pub struct CreatedComment {
    pub comment_id: String,
    pub created_at: String,
}

pub struct SocialService {
    store: Arc<dyn ItemStore>,
}

impl SocialService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    async fn viewer_identity(&self, user_id: &str) -> AppResult<(String, String)> {
        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let username = field_str(&profile, "username").unwrap_or_default().to_string();
        let display_name = field_str(&profile, "displayName")
            .unwrap_or_default()
            .to_string();
        Ok((username, display_name))
    }

    /// Read the rating META, or 404. Returns the owner id, place id, and the
    /// shared copy sort key.
    async fn rating_location(&self, rating_id: &str) -> AppResult<(Item, String, String, String)> {
        let meta = self
            .store
            .get(&ItemKey::new(keyspace::rating_pk(rating_id), keyspace::META_SK))
            .await?
            .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;
        let owner_id = field_str(&meta, "userId")
            .ok_or_else(|| AppError::DatabaseError("Rating META missing userId".to_string()))?
            .to_string();
        let place_id = field_str(&meta, "placeId")
            .ok_or_else(|| AppError::DatabaseError("Rating META missing placeId".to_string()))?
            .to_string();
        let created_at = field_str(&meta, "createdAt")
            .ok_or_else(|| AppError::DatabaseError("Rating META missing createdAt".to_string()))?
            .to_string();
        let rating_sk = keyspace::rating_sk(&created_at, rating_id);
        Ok((meta, owner_id, place_id, rating_sk))
    }

    /// Adjust a counter on the META and both rating copies concurrently.
    async fn bump_counters(
        &self,
        rating_id: &str,
        owner_id: &str,
        place_id: &str,
        rating_sk: &str,
        counter: &str,
        delta: f64,
    ) -> AppResult<()> {
        let meta_key = ItemKey::new(keyspace::rating_pk(rating_id), keyspace::META_SK);
        let owner_key = ItemKey::new(keyspace::user_pk(owner_id), rating_sk.to_string());
        let place_key = ItemKey::new(keyspace::place_pk(place_id), rating_sk.to_string());
        futures::try_join!(
            self.store.update(&meta_key, UpdateSpec::new().add(counter, delta)),
            self.store.update(&owner_key, UpdateSpec::new().add(counter, delta)),
            self.store.update(&place_key, UpdateSpec::new().add(counter, delta)),
        )?;
        Ok(())
    }

    /// Like if not liked, unlike if liked. The returned count reflects the
    /// META after this caller's own delta.
    pub async fn toggle_like(&self, user_id: &str, rating_id: &str) -> AppResult<LikeOutcome> {
        let (meta, owner_id, place_id, rating_sk) = self.rating_location(rating_id).await?;
        let like_key = ItemKey::new(keyspace::rating_pk(rating_id), keyspace::like_sk(user_id));
        let already_liked = self.store.get(&like_key).await?.is_some();
        let before = field_i64(&meta, "likeCount").unwrap_or(0);

        let delta = if already_liked {
            self.store.delete(&like_key).await?;
            -1.0
        } else {
            let (username, display_name) = self.viewer_identity(user_id).await?;
            let mut like = Item::new();
            like.insert("userId".into(), json!(user_id));
            like.insert("username".into(), json!(username));
            like.insert("displayName".into(), json!(display_name));
            like.insert("likedAt".into(), json!(keyspace::now_iso()));
            like.insert("entityType".into(), json!("Like"));
            self.store.put(&like_key, like).await?;
            1.0
        };

        self.bump_counters(rating_id, &owner_id, &place_id, &rating_sk, "likeCount", delta)
            .await?;

        // The response count is floored at zero; the stored counter is left
        // to converge on its own.
        let like_count = (before + delta as i64).max(0);
        Ok(LikeOutcome {
            liked: !already_liked,
            like_count,
        })
    }

    pub async fn create_comment(
        &self,
        user_id: &str,
        rating_id: &str,
        text: &str,
    ) -> AppResult<CreatedComment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Comment text is required".to_string()));
        }
        if text.chars().count() > MAX_COMMENT_LEN {
            return Err(AppError::Validation(format!(
                "Comment must be at most {} characters",
                MAX_COMMENT_LEN
            )));
        }

        let (_, owner_id, place_id, rating_sk) = self.rating_location(rating_id).await?;
        let (username, display_name) = self.viewer_identity(user_id).await?;

        let comment_id = keyspace::new_id();
        let created_at = keyspace::now_iso();
        let mut comment = Item::new();
        comment.insert("commentId".into(), json!(comment_id));
        comment.insert("userId".into(), json!(user_id));
        comment.insert("username".into(), json!(username));
        comment.insert("displayName".into(), json!(display_name));
        comment.insert("text".into(), json!(text));
        comment.insert("createdAt".into(), json!(created_at));
        comment.insert("entityType".into(), json!("Comment"));

        self.store
            .put(
                &ItemKey::new(
                    keyspace::rating_pk(rating_id),
                    keyspace::comment_sk(&created_at, &comment_id),
                ),
                comment,
            )
            .await?;

        self.bump_counters(rating_id, &owner_id, &place_id, &rating_sk, "commentCount", 1.0)
            .await?;

        Ok(CreatedComment {
            comment_id,
            created_at,
        })
    }

    /// Befriending writes two independent edges: FRIEND# under the caller and
    /// FOLLOWER# under the target. The forward edge lands first; a crash in
    /// between leaves a one-way friendship visible in the caller's list only.
    pub async fn add_friend(&self, user_id: &str, friend_username: &str) -> AppResult<Item> {
        let (friend, forward) = self.add_friend_forward(user_id, friend_username).await?;

        let friend_user_id = field_str(&friend, "userId").unwrap_or_default().to_string();
        let (username, display_name) = self.viewer_identity(user_id).await?;
        let mut follower = Item::new();
        follower.insert("followerUserId".into(), json!(user_id));
        follower.insert("followerUsername".into(), json!(username));
        follower.insert("followerDisplayName".into(), json!(display_name));
        follower.insert("followedAt".into(), json!(keyspace::now_iso()));
        follower.insert("entityType".into(), json!("Follower"));
        self.store
            .put(
                &ItemKey::new(
                    keyspace::user_pk(&friend_user_id),
                    keyspace::follower_sk(user_id),
                ),
                follower,
            )
            .await?;

        Ok(forward)
    }

    /// Forward half of `add_friend`: resolve the username, reject
    /// self-friending, write the FRIEND# edge. Split out so the partial
    /// failure mode stays exercisable.
    pub async fn add_friend_forward(
        &self,
        user_id: &str,
        friend_username: &str,
    ) -> AppResult<(Item, Item)> {
        let username_lower = friend_username.to_lowercase();
        let index = self
            .store
            .get(&ItemKey::new(
                keyspace::username_pk(&username_lower),
                keyspace::USERNAME_SK,
            ))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let friend_user_id = field_str(&index, "userId")
            .ok_or_else(|| AppError::DatabaseError("Username index missing userId".to_string()))?
            .to_string();

        if friend_user_id == user_id {
            return Err(AppError::BadRequest(
                "Cannot add yourself as a friend".to_string(),
            ));
        }

        let profile = self
            .store
            .get(&ItemKey::new(
                keyspace::user_pk(&friend_user_id),
                keyspace::PROFILE_SK,
            ))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let mut edge = Item::new();
        edge.insert("friendUserId".into(), json!(friend_user_id));
        edge.insert(
            "friendUsername".into(),
            json!(field_str(&profile, "username").unwrap_or_default()),
        );
        edge.insert(
            "friendDisplayName".into(),
            json!(field_str(&profile, "displayName").unwrap_or_default()),
        );
        edge.insert("addedAt".into(), json!(keyspace::now_iso()));
        edge.insert("entityType".into(), json!("Friend"));

        self.store
            .put(
                &ItemKey::new(
                    keyspace::user_pk(user_id),
                    keyspace::friend_sk(&friend_user_id),
                ),
                edge.clone(),
            )
            .await?;

        Ok((profile, edge))
    }

    pub async fn friends(&self, user_id: &str) -> AppResult<Vec<Item>> {
        let page = self
            .store
            .query(
                QuerySpec::partition(keyspace::user_pk(user_id))
                    .prefix(keyspace::FRIEND_PREFIX),
            )
            .await?;
        Ok(page.items.iter().map(projector::public_item).collect())
    }

    pub async fn followers(&self, user_id: &str) -> AppResult<Vec<Item>> {
        let page = self
            .store
            .query(
                QuerySpec::partition(keyspace::user_pk(user_id))
                    .prefix(keyspace::FOLLOWER_PREFIX),
            )
            .await?;
        Ok(page.items.iter().map(projector::public_item).collect())
    }
}
