use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    Item, ItemKey, ItemStore, QueryPage, QuerySpec, UpdateSpec, MAX_TRANSACT_ITEMS,
};

/// Postgres implementation of the item store: jsonb attributes, upserts via
/// ON CONFLICT, counter deltas computed inside single UPDATE statements.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to Postgres: {}", e))
            })?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
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
    item.remove("PK");
    item.remove("SK");
    serde_json::to_string(&item)
        .map_err(|e| AppError::DatabaseError(format!("Failed to serialize item: {}", e)))
}

/// Builds the jsonb update expression. Placeholders are numbered starting at
/// `first`, in SET-then-ADD order; the caller binds values in the same order.
fn update_expression(update: &UpdateSpec, first: usize) -> String {
    let mut expr = "attrs".to_string();
    let mut n = first;
    for (name, _) in &update.set {
        expr = format!("jsonb_set({}, '{{{}}}', ${}::jsonb, true)", expr, name, n);
        n += 1;
    }
    for name in &update.remove {
        expr = format!("({} - '{}')", expr, name);
    }
    for (name, _) in &update.add {
        expr = format!(
            "jsonb_set({}, '{{{}}}', to_jsonb(COALESCE((attrs->>'{}')::double precision, 0) + ${}), true)",
            expr, name, name, n
        );
        n += 1;
    }
    expr
}

#[async_trait]
impl ItemStore for PostgresStore {
    async fn get(&self, key: &ItemKey) -> AppResult<Option<Item>> {
        let row =
            sqlx::query("SELECT pk, sk, attrs::text AS attrs FROM items WHERE pk = $1 AND sk = $2")
                .bind(&key.pk)
                .bind(&key.sk)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to get item {}/{}: {}",
                        key.pk, key.sk, e
                    ))
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
        sqlx::query(
            "INSERT INTO items (pk, sk, attrs) VALUES ($1, $2, $3::jsonb) \
             ON CONFLICT (pk, sk) DO UPDATE SET attrs = EXCLUDED.attrs",
        )
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
        let result = sqlx::query("DELETE FROM items WHERE pk = $1 AND sk = $2")
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
            sqlx::query(
                "INSERT INTO items (pk, sk, attrs) VALUES ($1, $2, $3::jsonb) \
                 ON CONFLICT (pk, sk) DO UPDATE SET attrs = EXCLUDED.attrs",
            )
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

        sqlx::query(
            "INSERT INTO items (pk, sk, attrs) VALUES ($1, $2, '{}'::jsonb) \
             ON CONFLICT (pk, sk) DO NOTHING",
        )
        .bind(&key.pk)
        .bind(&key.sk)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to upsert item {}/{}: {}", key.pk, key.sk, e))
        })?;

        let sql = format!(
            "UPDATE items SET attrs = {} WHERE pk = $1 AND sk = $2",
            update_expression(&update, 3)
        );
        let mut q = sqlx::query(&sql).bind(&key.pk).bind(&key.sk);
        for (_, value) in &update.set {
            let encoded = serde_json::to_string(value).map_err(|e| {
                AppError::DatabaseError(format!("Failed to serialize update value: {}", e))
            })?;
            q = q.bind(encoded);
        }
        for (_, delta) in &update.add {
            q = q.bind(*delta);
        }
        q.execute(&self.pool).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to update item {}/{}: {}", key.pk, key.sk, e))
        })?;
        Ok(())
    }

    async fn query(&self, query: QuerySpec) -> AppResult<QueryPage> {
        let mut sql = "SELECT pk, sk, attrs::text AS attrs FROM items WHERE pk = $1".to_string();
        let mut binds: Vec<String> = vec![query.pk.clone()];

        if let Some(prefix) = &query.sk_prefix {
            sql.push_str(&format!(
                " AND sk >= ${} AND sk < ${}",
                binds.len() + 1,
                binds.len() + 2
            ));
            binds.push(prefix.clone());
            binds.push(format!("{}{}", prefix, '\u{ffff}'));
        }
        if let Some((low, high)) = &query.sk_between {
            sql.push_str(&format!(
                " AND sk BETWEEN ${} AND ${}",
                binds.len() + 1,
                binds.len() + 2
            ));
            binds.push(low.clone());
            binds.push(high.clone());
        }
        if let Some(start) = &query.start_after {
            let op = if query.descending { "<" } else { ">" };
            sql.push_str(&format!(" AND sk {} ${}", op, binds.len() + 1));
            binds.push(start.sk.clone());
        }
        sql.push_str(if query.descending {
            " ORDER BY sk DESC"
        } else {
            " ORDER BY sk ASC"
        });
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

        let clause = (0..keys.len())
            .map(|i| format!("(pk = ${} AND sk = ${})", i * 2 + 1, i * 2 + 2))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT pk, sk, attrs::text AS attrs FROM items WHERE {}",
            clause
        );
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
