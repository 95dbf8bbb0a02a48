//! In-memory store for tests and embedding-free setups.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Session creation happens under a
//! single write lock, which gives the same one-row-per-token guarantee the
//! SQLite unique constraint does.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Facet, MenuItem, Message, Role, Session};

use super::{order_by_ids, CatalogStore, ConversationStore, StoredVector, VectorStore};

#[derive(Default)]
struct Conversations {
    sessions: Vec<Session>,
    messages: Vec<Message>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<MenuItem>>,
    conversations: RwLock<Conversations>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_item(&self, item: &MenuItem) -> Result<i64> {
        let mut items = write(&self.items)?;
        let id = items.last().map(|i| i.id + 1).unwrap_or(1);
        let mut stored = item.clone();
        stored.id = id;
        items.push(stored);
        Ok(id)
    }

    async fn find_all(&self) -> Result<Vec<MenuItem>> {
        Ok(read(&self.items)?.clone())
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<MenuItem>> {
        Ok(read(&self.items)?
            .iter()
            .filter(|i| i.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<MenuItem>> {
        let matching: Vec<MenuItem> = read(&self.items)?
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect();
        Ok(order_by_ids(ids, matching))
    }

    async fn count_items(&self) -> Result<i64> {
        Ok(read(&self.items)?.len() as i64)
    }

    async fn clear_catalog(&self) -> Result<()> {
        write(&self.items)?.clear();
        write(&self.vectors)?.clear();
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        Ok(read(&self.conversations)?
            .sessions
            .iter()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn get_or_create_session(&self, token: &str) -> Result<Session> {
        let mut conv = write(&self.conversations)?;
        if let Some(existing) = conv.sessions.iter().find(|s| s.token == token) {
            return Ok(existing.clone());
        }
        let session = Session {
            id: conv.sessions.len() as i64 + 1,
            token: token.to_string(),
            created_at: Utc::now(),
        };
        conv.sessions.push(session.clone());
        Ok(session)
    }

    async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message> {
        let mut conv = write(&self.conversations)?;
        if !conv.sessions.iter().any(|s| s.id == session_id) {
            anyhow::bail!("session not found: {}", session_id);
        }
        let latest = conv
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.created_at)
            .max();
        let message = Message {
            id: conv.messages.len() as i64 + 1,
            session_id,
            role,
            content: content.to_string(),
            created_at: latest.map_or(at, |l| l.max(at)),
        };
        conv.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = read(&self.conversations)?
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        // Stamps never decrease within a session; the stable sort keeps
        // insertion order for ties
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn count_sessions(&self) -> Result<i64> {
        Ok(read(&self.conversations)?.sessions.len() as i64)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_vector(
        &self,
        item_id: i64,
        facet: Facet,
        _text: &str,
        vector: &[f32],
        _model: &str,
    ) -> Result<()> {
        let mut vectors = write(&self.vectors)?;
        vectors.retain(|v| !(v.item_id == item_id && v.facet == facet));
        vectors.push(StoredVector {
            item_id,
            facet,
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn vectors_for_facet(&self, facet: Facet) -> Result<Vec<StoredVector>> {
        Ok(read(&self.vectors)?
            .iter()
            .filter(|v| v.facet == facet)
            .cloned()
            .collect())
    }
}
