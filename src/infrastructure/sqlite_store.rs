use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    Item, ItemKey, ItemStore, QueryPage, QuerySpec, UpdateSpec, MAX_TRANSACT_ITEMS,
};

/// SQLite implementation of the item store. Attributes live in a JSON column;
/// partial updates and counter deltas are applied with the json1 functions in
/// a single UPDATE statement, so concurrent ADDs compose.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to SQLite: {}", e)))?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// In-memory store for tests. Pinned to one connection: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                attrs TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (pk, sk)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create items table: {}", e)))?;
        Ok(())
    }
}

fn decode_item(pk: String, sk: String, attrs: &str) -> AppResult<Item> {
    let value: serde_json::Value = serde_json::from_str(attrs)
        .map_err(|e| AppError::DatabaseError(format!("Corrupt item attributes: {}", e)))?;
    let mut item = match value {
        serde_json::Value::Object(map) => map,
        _ => Item::new(),
    };
    item.insert("PK".to_string(), serde_json::Value::String(pk));
    item.insert("SK".to_string(), serde_json::Value::String(sk));
    Ok(item)
}

fn encode_attrs(mut item: Item) -> AppResult<String> {
    // Key attributes live in their own columns.
    item.remove("PK");
    item.remove("SK");
    serde_json::to_string(&item)
        .map_err(|e| AppError::DatabaseError(format!("Failed to serialize item: {}", e)))
}

/// Builds the `attrs = <expr>` right-hand side for a partial update. SETs and
/// ADDs each contribute one bound placeholder, in iteration order.
fn update_expression(update: &UpdateSpec) -> String {
    let mut expr = "attrs".to_string();
    for (name, _) in &update.set {
        expr = format!("json_set({}, '$.{}', json(?))", expr, name);
    }
    for name in &update.remove {
        expr = format!("json_remove({}, '$.{}')", expr, name);
    }
    for (name, _) in &update.add {
        expr = format!(
            "json_set({}, '$.{}', COALESCE(json_extract(attrs, '$.{}'), 0) + ?)",
            expr, name, name
        );
    }
    expr
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn get(&self, key: &ItemKey) -> AppResult<Option<Item>> {
        let row = sqlx::query("SELECT pk, sk, attrs FROM items WHERE pk = ? AND sk = ?")
            .bind(&key.pk)
            .bind(&key.sk)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get item {}/{}: {}", key.pk, key.sk, e))
            })?;

        match row {
            Some(row) => Ok(Some(decode_item(
                row.get("pk"),
                row.get("sk"),
                row.get::<String, _>("attrs").as_str(),
            )?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &ItemKey, item: Item) -> AppResult<()> {
        let attrs = encode_attrs(item)?;
        sqlx::query("INSERT OR REPLACE INTO items (pk, sk, attrs) VALUES (?, ?, ?)")
            .bind(&key.pk)
            .bind(&key.sk)
            .bind(attrs)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to put item {}/{}: {}", key.pk, key.sk, e))
            })?;
        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM items WHERE pk = ? AND sk = ?")
            .bind(&key.pk)
            .bind(&key.sk)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to delete item {}/{}: {}",
                    key.pk, key.sk, e
                ))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn transact_put(&self, writes: Vec<(ItemKey, Item)>) -> AppResult<()> {
        if writes.len() > MAX_TRANSACT_ITEMS {
            return Err(AppError::DatabaseError(format!(
                "Transaction limited to {} items, got {}",
                MAX_TRANSACT_ITEMS,
                writes.len()
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        for (key, item) in writes {
            let attrs = encode_attrs(item)?;
            sqlx::query("INSERT OR REPLACE INTO items (pk, sk, attrs) VALUES (?, ?, ?)")
                .bind(&key.pk)
                .bind(&key.sk)
                .bind(attrs)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to put item {}/{} in transaction: {}",
                        key.pk, key.sk, e
                    ))
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    async fn update(&self, key: &ItemKey, update: UpdateSpec) -> AppResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        // Upsert: make sure the row exists, then apply the whole partial
        // update in one statement against the current attributes.
        sqlx::query("INSERT INTO items (pk, sk, attrs) VALUES (?, ?, '{}') ON CONFLICT(pk, sk) DO NOTHING")
            .bind(&key.pk)
            .bind(&key.sk)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to upsert item {}/{}: {}",
                    key.pk, key.sk, e
                ))
            })?;

        let sql = format!(
            "UPDATE items SET attrs = {} WHERE pk = ? AND sk = ?",
            update_expression(&update)
        );
        let mut q = sqlx::query(&sql);
        for (_, value) in &update.set {
            let encoded = serde_json::to_string(value).map_err(|e| {
                AppError::DatabaseError(format!("Failed to serialize update value: {}", e))
            })?;
            q = q.bind(encoded);
        }
        for (_, delta) in &update.add {
            if delta.fract() == 0.0 {
                q = q.bind(*delta as i64);
            } else {
                q = q.bind(*delta);
            }
        }
        q.bind(&key.pk)
            .bind(&key.sk)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to update item {}/{}: {}",
                    key.pk, key.sk, e
                ))
            })?;
        Ok(())
    }

    async fn query(&self, query: QuerySpec) -> AppResult<QueryPage> {
        let mut sql = "SELECT pk, sk, attrs FROM items WHERE pk = ?".to_string();
        let mut binds: Vec<String> = vec![query.pk.clone()];

        if let Some(prefix) = &query.sk_prefix {
            sql.push_str(" AND sk >= ? AND sk < ?");
            binds.push(prefix.clone());
            binds.push(format!("{}{}", prefix, '\u{ffff}'));
        }
        if let Some((low, high)) = &query.sk_between {
            sql.push_str(" AND sk BETWEEN ? AND ?");
            binds.push(low.clone());
            binds.push(high.clone());
        }
        if let Some(start) = &query.start_after {
            if query.descending {
                sql.push_str(" AND sk < ?");
            } else {
                sql.push_str(" AND sk > ?");
            }
            binds.push(start.sk.clone());
        }
        sql.push_str(if query.descending {
            " ORDER BY sk DESC"
        } else {
            " ORDER BY sk ASC"
        });

        // Over-fetch by one to know whether a continuation key is warranted.
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit as i64 + 1));
        }

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query items: {}", e)))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(decode_item(
                row.get("pk"),
                row.get("sk"),
                row.get::<String, _>("attrs").as_str(),
            )?);
        }

        let mut last_key = None;
        if let Some(limit) = query.limit {
            if items.len() > limit as usize {
                items.truncate(limit as usize);
                let last = items.last().expect("limit >= 1");
                last_key = Some(ItemKey::new(
                    last.get("PK").and_then(|v| v.as_str()).unwrap_or_default(),
                    last.get("SK").and_then(|v| v.as_str()).unwrap_or_default(),
                ));
            }
        }

        Ok(QueryPage { items, last_key })
    }

    async fn batch_get(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let clause = vec!["(pk = ? AND sk = ?)"; keys.len()].join(" OR ");
        let sql = format!("SELECT pk, sk, attrs FROM items WHERE {}", clause);
        let mut q = sqlx::query(&sql);
        for key in keys {
            q = q.bind(&key.pk).bind(&key.sk);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to batch-get items: {}", e)))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(decode_item(
                row.get("pk"),
                row.get("sk"),
                row.get::<String, _>("attrs").as_str(),
            )?);
        }
        Ok(items)
    }
}
