pub mod api;
pub mod app_state;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod keyspace;
pub mod pagination;
pub mod services;

pub use error::{AppError, AppResult};
