pub mod aggregates;
pub mod feed;
pub mod projector;
pub mod ratings;
pub mod social;
pub mod users;
