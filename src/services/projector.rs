//! Shapes stored items into API-facing objects.
//!
//! Storage-only attributes (`PK`, `SK`, `entityType`, and `passwordHash` on
//! profiles) never leave this boundary. Items read back from the store have
//! no static shape, so all field access here fails closed: missing or
//! mistyped attributes read as absent or zero.

use serde_json::{json, Value};

use crate::config::PhotoConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{field_str, Item, ItemKey, ItemStore, QuerySpec};
use crate::keyspace;
use crate::pagination;
use crate::collaborators::photos;

/// Strip storage-only attributes from a stored item.
pub fn public_item(item: &Item) -> Item {
    let mut out = item.clone();
    out.remove("PK");
    out.remove("SK");
    out.remove("entityType");
    out
}

/// Profile variant: additionally strips credentials.
pub fn public_profile(item: &Item) -> Item {
    let mut out = public_item(item);
    out.remove("passwordHash");
    out
}

/// Project a rating copy: strip storage fields and attach a `photoUrl` when a
/// photo key is present. No key means no `photoUrl` field at all.
pub fn project_rating(item: &Item, config: &PhotoConfig) -> Item {
    let mut out = public_item(item);
    if let Some(photo_key) = field_str(item, "photoKey") {
        let url = photos::photo_url(config, photo_key);
        out.insert("photoUrl".to_string(), Value::String(url));
    }
    out
}

/// Which of the given ratings has the viewer liked? Empty without a viewer.
pub async fn liked_rating_ids(
    store: &dyn ItemStore,
    rating_ids: &[String],
    viewer_id: Option<&str>,
) -> AppResult<Vec<String>> {
    let Some(viewer_id) = viewer_id else {
        return Ok(Vec::new());
    };
    if rating_ids.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<ItemKey> = rating_ids
        .iter()
        .map(|id| ItemKey::new(keyspace::rating_pk(id), keyspace::like_sk(viewer_id)))
        .collect();
    let found = store.batch_get(&keys).await?;

    Ok(found
        .iter()
        .filter_map(|item| field_str(item, "PK"))
        .filter_map(|pk| pk.strip_prefix("RATING#"))
        .map(str::to_string)
        .collect())
}

/// One page of rating copies from a single partition, with opaque cursor and
/// the viewer's like marks.
pub struct RatingPage {
    pub ratings: Vec<Item>,
    pub liked_rating_ids: Vec<String>,
    pub next_cursor: Option<String>,
}

async fn rating_list(
    store: &dyn ItemStore,
    config: &PhotoConfig,
    pk: String,
    viewer_id: Option<&str>,
    limit: u32,
    cursor: Option<&str>,
) -> AppResult<RatingPage> {
    let page = store
        .query(
            QuerySpec::partition(pk)
                .prefix(keyspace::RATING_PREFIX)
                .newest_first()
                .limit(limit)
                .start_after(pagination::decode_cursor(cursor)),
        )
        .await?;

    let ids: Vec<String> = page
        .items
        .iter()
        .filter_map(|item| field_str(item, "ratingId"))
        .map(str::to_string)
        .collect();
    let liked = liked_rating_ids(store, &ids, viewer_id).await?;

    Ok(RatingPage {
        ratings: page
            .items
            .iter()
            .map(|item| project_rating(item, config))
            .collect(),
        liked_rating_ids: liked,
        next_cursor: pagination::encode_cursor(&page.last_key),
    })
}

/// "My ratings" query: the owner-copy partition, newest first.
pub async fn user_ratings(
    store: &dyn ItemStore,
    config: &PhotoConfig,
    user_id: &str,
    viewer_id: Option<&str>,
    limit: u32,
    cursor: Option<&str>,
) -> AppResult<RatingPage> {
    rating_list(store, config, keyspace::user_pk(user_id), viewer_id, limit, cursor).await
}

/// "Place ratings" query: the place-copy partition, newest first.
pub async fn place_ratings(
    store: &dyn ItemStore,
    config: &PhotoConfig,
    place_id: &str,
    viewer_id: Option<&str>,
    limit: u32,
    cursor: Option<&str>,
) -> AppResult<RatingPage> {
    rating_list(store, config, keyspace::place_pk(place_id), viewer_id, limit, cursor).await
}

pub struct RatingDetail {
    pub rating: Item,
    pub likes: Vec<Value>,
    pub comments: Vec<Value>,
    pub is_liked_by_me: bool,
}

/// Single-rating detail: one query over the rating's partition, partitioned
/// by sort-key prefix into exactly one META plus its likes and comments.
pub async fn rating_detail(
    store: &dyn ItemStore,
    config: &PhotoConfig,
    rating_id: &str,
    viewer_id: Option<&str>,
) -> AppResult<RatingDetail> {
    let page = store
        .query(QuerySpec::partition(keyspace::rating_pk(rating_id)))
        .await?;

    let mut meta: Option<&Item> = None;
    let mut likes: Vec<Value> = Vec::new();
    let mut comments: Vec<Value> = Vec::new();
    let mut liked_by: Vec<String> = Vec::new();

    for item in &page.items {
        let sk = field_str(item, "SK").unwrap_or_default();
        if sk == keyspace::META_SK {
            meta = Some(item);
        } else if sk.starts_with(keyspace::LIKE_PREFIX) {
            if let Some(user_id) = field_str(item, "userId") {
                liked_by.push(user_id.to_string());
            }
            likes.push(json!({
                "userId": field_str(item, "userId").unwrap_or_default(),
                "username": field_str(item, "username").unwrap_or_default(),
                "displayName": field_str(item, "displayName").unwrap_or_default(),
            }));
        } else if sk.starts_with(keyspace::COMMENT_PREFIX) {
            comments.push(json!({
                "commentId": field_str(item, "commentId").unwrap_or_default(),
                "userId": field_str(item, "userId").unwrap_or_default(),
                "username": field_str(item, "username").unwrap_or_default(),
                "displayName": field_str(item, "displayName").unwrap_or_default(),
                "text": field_str(item, "text").unwrap_or_default(),
                "createdAt": field_str(item, "createdAt").unwrap_or_default(),
            }));
        }
    }

    let meta = meta.ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;
    let is_liked_by_me = viewer_id
        .map(|viewer| liked_by.iter().any(|id| id == viewer))
        .unwrap_or(false);

    Ok(RatingDetail {
        rating: project_rating(meta, config),
        likes,
        comments,
        is_liked_by_me,
    })
}
