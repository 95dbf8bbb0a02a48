//! SQLite-backed store.
//!
//! Maps each store operation onto the schema created by
//! [`migrate::apply`](crate::migrate::apply): `drink_items`,
//! `chat_sessions`, `chat_messages`, and `drink_vectors`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Facet, MenuItem, Message, Role, Session};

use super::{order_by_ids, CatalogStore, ConversationStore, StoredVector, VectorStore};

const ITEM_COLUMNS: &str = "id, beverage_category, beverage, beverage_prep, calories, total_fat, \
     trans_fat, saturated_fat, sodium, total_carbohydrates, cholesterol, dietary_fibre, sugars, \
     protein, vitamin_a, vitamin_c, calcium, iron, caffeine";

/// SQLite implementation of every store trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_item(row: &SqliteRow) -> MenuItem {
    MenuItem {
        id: row.get("id"),
        category: row.get("beverage_category"),
        name: row.get("beverage"),
        prep: row.get("beverage_prep"),
        calories: row.get("calories"),
        total_fat: row.get("total_fat"),
        trans_fat: row.get("trans_fat"),
        saturated_fat: row.get("saturated_fat"),
        sodium: row.get("sodium"),
        total_carbohydrates: row.get("total_carbohydrates"),
        cholesterol: row.get("cholesterol"),
        dietary_fibre: row.get("dietary_fibre"),
        sugars: row.get("sugars"),
        protein: row.get("protein"),
        vitamin_a: row.get("vitamin_a"),
        vitamin_c: row.get("vitamin_c"),
        calcium: row.get("calcium"),
        iron: row.get("iron"),
        caffeine: row.get("caffeine"),
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_session(row: &SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        token: row.get("session_token"),
        created_at: from_millis(row.get("created_at")),
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    Ok(Message {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: Role::parse(&role).with_context(|| format!("unknown message role: {}", role))?,
        content: row.get("content"),
        created_at: from_millis(row.get("created_at")),
    })
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn insert_item(&self, item: &MenuItem) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO drink_items (beverage_category, beverage, beverage_prep, calories,
                                     total_fat, trans_fat, saturated_fat, sodium,
                                     total_carbohydrates, cholesterol, dietary_fibre, sugars,
                                     protein, vitamin_a, vitamin_c, calcium, iron, caffeine)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.category)
        .bind(&item.name)
        .bind(&item.prep)
        .bind(item.calories)
        .bind(item.total_fat)
        .bind(item.trans_fat)
        .bind(item.saturated_fat)
        .bind(item.sodium)
        .bind(item.total_carbohydrates)
        .bind(item.cholesterol)
        .bind(item.dietary_fibre)
        .bind(item.sugars)
        .bind(item.protein)
        .bind(&item.vitamin_a)
        .bind(&item.vitamin_c)
        .bind(&item.calcium)
        .bind(&item.iron)
        .bind(item.caffeine)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_all(&self) -> Result<Vec<MenuItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM drink_items ORDER BY id ASC",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<MenuItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM drink_items WHERE LOWER(beverage_category) = LOWER(?) ORDER BY id ASC",
            ITEM_COLUMNS
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<MenuItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM drink_items WHERE id IN ({})",
            ITEM_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(order_by_ids(ids, rows.iter().map(row_to_item).collect()))
    }

    async fn count_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drink_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn clear_catalog(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM drink_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM drink_items")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, session_token, created_at FROM chat_sessions WHERE session_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn get_or_create_session(&self, token: &str) -> Result<Session> {
        // The UNIQUE constraint arbitrates concurrent first calls; losers
        // fall through to the lookup below.
        sqlx::query(
            "INSERT INTO chat_sessions (session_token, created_at) VALUES (?, ?) \
             ON CONFLICT(session_token) DO NOTHING",
        )
        .bind(token)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.find_session_by_token(token)
            .await?
            .with_context(|| format!("session vanished after insert: {}", token))
    }

    async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message> {
        // Never stamp earlier than the session's latest message, so a clock
        // stepping backwards cannot reorder history.
        let row = sqlx::query(
            "INSERT INTO chat_messages (session_id, role, content, created_at) \
             VALUES (?, ?, ?, MAX(?, COALESCE( \
                 (SELECT MAX(created_at) FROM chat_messages WHERE session_id = ?), 0))) \
             RETURNING id, created_at",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(at.timestamp_millis())
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id: row.get("id"),
            session_id,
            role,
            content: content.to_string(),
            created_at: from_millis(row.get("created_at")),
        })
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM chat_messages \
             WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn count_sessions(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_vector(
        &self,
        item_id: i64,
        facet: Facet,
        text: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drink_vectors (drink_id, facet, text, model, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(drink_id, facet) DO UPDATE SET
                text = excluded.text,
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(item_id)
        .bind(facet.as_str())
        .bind(text)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn vectors_for_facet(&self, facet: Facet) -> Result<Vec<StoredVector>> {
        let rows = sqlx::query("SELECT drink_id, embedding FROM drink_vectors WHERE facet = ?")
            .bind(facet.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                StoredVector {
                    item_id: row.get("drink_id"),
                    facet,
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }
}
