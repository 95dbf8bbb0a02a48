//! Storage abstraction for menu-chat.
//!
//! Three traits cover everything the pipeline persists:
//!
//! | Trait | Holds |
//! |-------|-------|
//! | [`CatalogStore`] | Beverage records, read-only after ingestion |
//! | [`ConversationStore`] | Sessions and their ordered messages |
//! | [`VectorStore`] | Per-facet embedding vectors for catalog items |
//!
//! [`InMemoryStore`](memory::InMemoryStore) and
//! [`SqliteStore`](sqlite::SqliteStore) implement all three.
//! Implementations must be `Send + Sync`; the server shares one instance
//! across every request.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Facet, MenuItem, Message, Role, Session};

/// Read access to the beverage catalog, plus the writes ingestion needs.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a record and return its newly assigned id. `item.id` is ignored.
    async fn insert_item(&self, item: &MenuItem) -> Result<i64>;

    /// Every record, in id order.
    async fn find_all(&self) -> Result<Vec<MenuItem>>;

    /// Records whose category equals `category`, ignoring ASCII case.
    async fn find_by_category(&self, category: &str) -> Result<Vec<MenuItem>>;

    /// Records for `ids`, in the order requested. Unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<MenuItem>>;

    /// Number of records in the catalog.
    async fn count_items(&self) -> Result<i64>;

    /// Remove every record (and anything keyed by record id).
    async fn clear_catalog(&self) -> Result<()>;
}

/// Session and message persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Look up the session for `token`, creating it if absent.
    ///
    /// Must converge on a single row when called concurrently for the same
    /// unseen token.
    async fn get_or_create_session(&self, token: &str) -> Result<Session>;

    /// Append a message stamped with `at`, or with the session's latest
    /// stamp if `at` is earlier. Returns the stored message.
    async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message>;

    /// All messages of a session ordered by timestamp, ties broken by
    /// insertion order.
    async fn list_messages(&self, session_id: i64) -> Result<Vec<Message>>;

    async fn count_sessions(&self) -> Result<i64>;
}

/// A stored embedding for one catalog item under one facet.
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub item_id: i64,
    pub facet: Facet,
    pub vector: Vec<f32>,
}

/// Embedding persistence for the similarity search gateway.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store or replace the vector for `(item_id, facet)`.
    async fn upsert_vector(
        &self,
        item_id: i64,
        facet: Facet,
        text: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()>;

    /// Every vector indexed under `facet`.
    async fn vectors_for_facet(&self, facet: Facet) -> Result<Vec<StoredVector>>;
}

/// Reorders `items` to follow `ids`, dropping ids with no record.
pub(crate) fn order_by_ids(ids: &[i64], items: Vec<MenuItem>) -> Vec<MenuItem> {
    let mut by_id: std::collections::HashMap<i64, MenuItem> =
        items.into_iter().map(|item| (item.id, item)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
