pub mod auth;
pub mod caffeine;
pub mod photos;
