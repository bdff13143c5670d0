pub mod postgres_store;
pub mod sqlite_store;
pub mod store;

pub use postgres_store::PostgresStore;
pub use sqlite_store::SqliteStore;
pub use store::{Item, ItemKey, ItemStore, QueryPage, QuerySpec, UpdateSpec};
