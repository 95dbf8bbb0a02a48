//! Core data models used throughout menu-chat.
//!
//! These types represent catalog records, conversation sessions and their
//! messages, and the ephemeral matches returned by similarity search.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A beverage catalog record. Immutable once loaded.
///
/// Every nutritional field is optional: `None` means the source value was
/// unknown (empty or `"Varies"`), which is distinct from zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    /// Assigned by the store at load time; ignored on insert.
    pub id: i64,
    pub category: String,
    pub name: String,
    pub prep: String,
    pub calories: Option<i64>,
    pub total_fat: Option<f64>,
    pub trans_fat: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub sodium: Option<i64>,
    pub total_carbohydrates: Option<i64>,
    pub cholesterol: Option<i64>,
    pub dietary_fibre: Option<i64>,
    pub sugars: Option<i64>,
    pub protein: Option<f64>,
    pub vitamin_a: Option<String>,
    pub vitamin_c: Option<String>,
    pub calcium: Option<String>,
    pub iron: Option<String>,
    pub caffeine: Option<i64>,
}

impl MenuItem {
    /// A record with only the identifying text fields set.
    pub fn named(category: &str, name: &str, prep: &str) -> Self {
        Self {
            id: 0,
            category: category.to_string(),
            name: name.to_string(),
            prep: prep.to_string(),
            calories: None,
            total_fat: None,
            trans_fat: None,
            saturated_fat: None,
            sodium: None,
            total_carbohydrates: None,
            cholesterol: None,
            dietary_fibre: None,
            sugars: None,
            protein: None,
            vitamin_a: None,
            vitamin_c: None,
            calcium: None,
            iron: None,
            caffeine: None,
        }
    }
}

/// A conversation, keyed internally by `id` and externally by `token`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "USER" => Some(Role::User),
            "ASSISTANT" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Speaker label used when rendering a transcript line.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One turn of a conversation, owned by a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One of the two independently indexed views of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Description,
    Nutrition,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Description => "description",
            Facet::Nutrition => "nutrition",
        }
    }

    pub fn parse(s: &str) -> Option<Facet> {
        match s {
            "description" => Some(Facet::Description),
            "nutrition" | "nutritional" => Some(Facet::Nutrition),
            _ => None,
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked search hit, scoped to a single search call and facet.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub item_id: i64,
    pub score: f32,
    pub facet: Facet,
}
