//! Shared harness: services over a fresh in-memory store.

use std::sync::Arc;

use brewlog::config::PhotoConfig;
use brewlog::infrastructure::{ItemKey, ItemStore, SqliteStore};
use brewlog::keyspace;
use brewlog::services::feed::FeedService;
use brewlog::services::ratings::{CreateRatingRequest, RatingService};
use brewlog::services::social::SocialService;
use brewlog::services::users::{CreateUserRequest, UserService};
use serde_json::Value;

pub struct TestApp {
    pub store: Arc<dyn ItemStore>,
    pub users: UserService,
    pub ratings: RatingService,
    pub social: SocialService,
    pub feed: FeedService,
    pub photos: PhotoConfig,
}

pub async fn test_app() -> TestApp {
    let store: Arc<dyn ItemStore> = Arc::new(
        SqliteStore::new_in_memory()
            .await
            .expect("in-memory store"),
    );
    TestApp {
        users: UserService::new(store.clone()),
        ratings: RatingService::new(store.clone()),
        social: SocialService::new(store.clone()),
        feed: FeedService::new(store.clone()),
        photos: PhotoConfig {
            endpoint: None,
            bucket: "test-bucket".to_string(),
        },
        store,
    }
}

impl TestApp {
    /// Register a user and return their id.
    pub async fn register(&self, username: &str) -> String {
        let user = self
            .users
            .create(CreateUserRequest {
                username: username.to_string(),
                display_name: format!("{} display", username),
                password: "correct-horse".to_string(),
            })
            .await
            .expect("register user");
        user.get("userId")
            .and_then(Value::as_str)
            .expect("userId on profile")
            .to_string()
    }

    pub async fn get_item(&self, pk: &str, sk: &str) -> Option<brewlog::infrastructure::Item> {
        self.store
            .get(&ItemKey::new(pk, sk))
            .await
            .expect("point read")
    }

    pub async fn rating_meta(&self, rating_id: &str) -> brewlog::infrastructure::Item {
        self.get_item(&keyspace::rating_pk(rating_id), keyspace::META_SK)
            .await
            .expect("rating meta")
    }
}

pub fn rating_request(place_id: &str, stars: f64, drink_name: &str) -> CreateRatingRequest {
    CreateRatingRequest {
        place_id: place_id.to_string(),
        place_name: format!("{} cafe", place_id),
        stars,
        drink_name: drink_name.to_string(),
        description: None,
        photo_key: None,
        caffeine_mg: None,
        lat: 52.37,
        lng: 4.89,
        address: None,
    }
}

/// Creation timestamps double as sort-key components at millisecond
/// precision; writes in the same test must not tie.
pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
}

pub fn str_field<'a>(item: &'a brewlog::infrastructure::Item, name: &str) -> &'a str {
    item.get(name).and_then(Value::as_str).unwrap_or_default()
}

pub fn num_field(item: &brewlog::infrastructure::Item, name: &str) -> f64 {
    item.get(name).and_then(Value::as_f64).unwrap_or_default()
}
