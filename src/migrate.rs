use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drink_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            beverage_category TEXT NOT NULL,
            beverage TEXT NOT NULL,
            beverage_prep TEXT NOT NULL,
            calories INTEGER,
            total_fat REAL,
            trans_fat REAL,
            saturated_fat REAL,
            sodium INTEGER,
            total_carbohydrates INTEGER,
            cholesterol INTEGER,
            dietary_fibre INTEGER,
            sugars INTEGER,
            protein REAL,
            vitamin_a TEXT,
            vitamin_c TEXT,
            calcium TEXT,
            iron TEXT,
            caffeine INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per externally visible token; the UNIQUE constraint is what
    // keeps concurrent first messages from creating duplicates.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_token TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors, one row per (item, facet)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drink_vectors (
            drink_id INTEGER NOT NULL,
            facet TEXT NOT NULL,
            text TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (drink_id, facet),
            FOREIGN KEY (drink_id) REFERENCES drink_items(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_drink_items_category ON drink_items(LOWER(beverage_category))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, created_at, id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_drink_vectors_facet ON drink_vectors(facet)")
        .execute(pool)
        .await?;

    Ok(())
}
