//! Accounts: registration, login, profile reads, caffeine stats.
//!
//! Username uniqueness rides on a dedicated `USERNAME#<lowercase>` index item
//! so lookups and the taken-check are point reads regardless of user count.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::collaborators::auth;
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    field_f64, field_str, Item, ItemKey, ItemStore, QuerySpec,
};
use crate::keyspace;
use crate::services::projector;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CaffeineStats {
    pub today_mg: f64,
    pub total_mg: f64,
}

fn validate_new_user(req: &CreateUserRequest) -> AppResult<()> {
    let username_len = req.username.chars().count();
    if !(3..=30).contains(&username_len) || !USERNAME_RE.is_match(&req.username) {
        return Err(AppError::Validation(
            "Username must be 3-30 characters of letters, digits, or underscores".to_string(),
        ));
    }
    let display_len = req.display_name.chars().count();
    if !(1..=50).contains(&display_len) {
        return Err(AppError::Validation(
            "Display name must be between 1 and 50 characters".to_string(),
        ));
    }
    let password_len = req.password.chars().count();
    if !(6..=100).contains(&password_len) {
        return Err(AppError::Validation(
            "Password must be between 6 and 100 characters".to_string(),
        ));
    }
    Ok(())
}

pub struct UserService {
    store: Arc<dyn ItemStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: CreateUserRequest) -> AppResult<Item> {
        validate_new_user(&req)?;

        let username_lower = req.username.to_lowercase();
        let index_key = ItemKey::new(keyspace::username_pk(&username_lower), keyspace::USERNAME_SK);
        if self.store.get(&index_key).await?.is_some() {
            return Err(AppError::BadRequest("Username already taken".to_string()));
        }

        let user_id = keyspace::new_id();
        let created_at = keyspace::now_iso();
        let password_hash = auth::hash_password(&req.password)?;

        let mut profile = Item::new();
        profile.insert("userId".into(), json!(user_id));
        profile.insert("username".into(), json!(req.username));
        profile.insert("displayName".into(), json!(req.display_name));
        profile.insert("passwordHash".into(), json!(password_hash));
        profile.insert("totalCaffeineMg".into(), json!(0));
        profile.insert("createdAt".into(), json!(created_at));
        profile.insert("entityType".into(), json!("User"));

        let mut index = Item::new();
        index.insert("userId".into(), json!(user_id));
        index.insert("username".into(), json!(req.username));
        index.insert("entityType".into(), json!("UsernameIndex"));

        // Racing registrations for the same name can both pass the check;
        // the last index write wins and the loser's profile is orphaned.
        self.store
            .put(
                &ItemKey::new(keyspace::user_pk(&user_id), keyspace::PROFILE_SK),
                profile.clone(),
            )
            .await?;
        self.store.put(&index_key, index).await?;

        Ok(projector::public_profile(&profile))
    }

    /// Any miss (unknown name, bad password, unreadable hash) is the same
    /// 401, so the response does not reveal which usernames exist.
    pub async fn login(&self, req: LoginRequest) -> AppResult<Item> {
        let denied = || AppError::Unauthorized("Invalid username or password".to_string());

        let username_lower = req.username.to_lowercase();
        let index = self
            .store
            .get(&ItemKey::new(
                keyspace::username_pk(&username_lower),
                keyspace::USERNAME_SK,
            ))
            .await?
            .ok_or_else(denied)?;
        let user_id = field_str(&index, "userId").ok_or_else(denied)?;

        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?
            .ok_or_else(denied)?;
        let hash = field_str(&profile, "passwordHash").ok_or_else(denied)?;

        if !auth::verify_password(&req.password, hash) {
            return Err(denied());
        }

        Ok(projector::public_profile(&profile))
    }

    pub async fn get_by_username(&self, username: &str) -> AppResult<Item> {
        let username_lower = username.to_lowercase();
        let index = self
            .store
            .get(&ItemKey::new(
                keyspace::username_pk(&username_lower),
                keyspace::USERNAME_SK,
            ))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let user_id = field_str(&index, "userId")
            .ok_or_else(|| AppError::DatabaseError("Username index missing userId".to_string()))?;

        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(projector::public_profile(&profile))
    }

    /// Today's intake is summed live from the day's rating copies; the
    /// lifetime total is the counter maintained by rating writes.
    pub async fn caffeine_stats(&self, user_id: &str) -> AppResult<CaffeineStats> {
        let today = keyspace::now_iso()[..10].to_string();
        let low = format!("{}{}", keyspace::RATING_PREFIX, today);
        let high = format!("{}\u{ffff}", low);

        let page = self
            .store
            .query(QuerySpec::partition(keyspace::user_pk(user_id)).between(low, high))
            .await?;
        let today_mg: f64 = page
            .items
            .iter()
            .filter_map(|item| field_f64(item, "caffeineMg"))
            .sum();

        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?;
        let total_mg = profile
            .as_ref()
            .and_then(|p| field_f64(p, "totalCaffeineMg"))
            .unwrap_or(0.0);

        Ok(CaffeineStats { today_mg, total_mg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_charset_is_enforced() {
        assert!(USERNAME_RE.is_match("ada_99"));
        assert!(!USERNAME_RE.is_match("ada lovelace"));
        assert!(!USERNAME_RE.is_match("ada-99"));
    }

    #[test]
    fn validation_rejects_out_of_range_lengths() {
        let base = CreateUserRequest {
            username: "ada".into(),
            display_name: "Ada".into(),
            password: "secret".into(),
        };
        assert!(validate_new_user(&base).is_ok());

        let short = CreateUserRequest {
            username: "ab".into(),
            ..base.clone()
        };
        assert!(validate_new_user(&short).is_err());

        let weak = CreateUserRequest {
            password: "12345".into(),
            ..base
        };
        assert!(validate_new_user(&weak).is_err());
    }
}
