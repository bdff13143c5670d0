use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{ItemStore, PostgresStore, SqliteStore};
use crate::services::feed::FeedService;
use crate::services::ratings::RatingService;
use crate::services::social::SocialService;
use crate::services::users::UserService;

/// Shared handler state: one store connection pool behind the trait object,
/// the services built over it, and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
    pub config: Arc<Config>,
    pub users: Arc<UserService>,
    pub ratings: Arc<RatingService>,
    pub social: Arc<SocialService>,
    pub feed: Arc<FeedService>,
}

impl AppState {
    pub fn new(store: Arc<dyn ItemStore>, config: Config) -> Self {
        Self {
            users: Arc::new(UserService::new(store.clone())),
            ratings: Arc::new(RatingService::new(store.clone())),
            social: Arc::new(SocialService::new(store.clone())),
            feed: Arc::new(FeedService::new(store.clone())),
            store,
            config: Arc::new(config),
        }
    }

    /// Connect to the store named by `DATABASE_URL` and ensure its schema.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let url = config.database.url.clone();
        let store: Arc<dyn ItemStore> = if url.starts_with("postgres") {
            let store = PostgresStore::connect(&url).await?;
            store.initialize().await?;
            Arc::new(store)
        } else if url.starts_with("sqlite") {
            let store = SqliteStore::connect(&url).await?;
            store.initialize().await?;
            Arc::new(store)
        } else {
            return Err(AppError::Internal(format!(
                "Unsupported DATABASE_URL scheme: {}",
                url
            )));
        };
        Ok(Self::new(store, config))
    }
}
