//! Key layout for the single-table store.
//!
//! Every entity maps deterministically to a `(PK, SK)` pair. Partition keys
//! select a queryable unit (a user, a place, a rating's sub-collection); sort
//! keys order and filter within it. Range-queried sort keys put a fixed-width
//! ISO-8601 timestamp before the unique id so lexicographic order equals
//! chronological order, with id as tiebreaker.

use chrono::Utc;
use uuid::Uuid;

pub const PROFILE_SK: &str = "PROFILE";
pub const META_SK: &str = "META";
pub const USERNAME_SK: &str = "USERNAME";

pub const RATING_PREFIX: &str = "RATING#";
pub const LIKE_PREFIX: &str = "LIKE#";
pub const COMMENT_PREFIX: &str = "COMMENT#";
pub const FRIEND_PREFIX: &str = "FRIEND#";
pub const FOLLOWER_PREFIX: &str = "FOLLOWER#";

pub fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

pub fn username_pk(username_lower: &str) -> String {
    format!("USERNAME#{}", username_lower)
}

pub fn place_pk(place_id: &str) -> String {
    format!("PLACE#{}", place_id)
}

pub fn rating_pk(rating_id: &str) -> String {
    format!("RATING#{}", rating_id)
}

/// Sort key shared by the owner copy and the place copy of a rating.
pub fn rating_sk(created_at: &str, rating_id: &str) -> String {
    format!("RATING#{}#{}", created_at, rating_id)
}

pub fn like_sk(user_id: &str) -> String {
    format!("LIKE#{}", user_id)
}

pub fn comment_sk(created_at: &str, comment_id: &str) -> String {
    format!("COMMENT#{}#{}", created_at, comment_id)
}

pub fn user_place_sk(place_id: &str) -> String {
    format!("PLACE#{}", place_id)
}

pub fn friend_sk(friend_user_id: &str) -> String {
    format!("FRIEND#{}", friend_user_id)
}

pub fn follower_sk(follower_user_id: &str) -> String {
    format!("FOLLOWER#{}", follower_user_id)
}

/// Current UTC time as a fixed-width ISO-8601 string, usable directly as a
/// sort-key component.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Collision-free identifier for ratings, comments, and photo object keys.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
