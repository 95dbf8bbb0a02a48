//! Menu context assembly.
//!
//! Turns a user message into the catalog text injected ahead of the
//! conversation. The description facet is always searched; the nutrition
//! facet only when the lower-cased message contains one of
//! [`NUTRITION_KEYWORDS`] as a substring.
//!
//! A failing or empty search never fails the request: that facet simply
//! contributes no block. A failing catalog lookup does, since the hits
//! cannot be rendered without their records.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::format_drinks_for_ai;
use crate::config::RetrievalConfig;
use crate::models::{Facet, MenuItem};
use crate::search::SimilaritySearch;
use crate::store::CatalogStore;

/// Substrings that mark a message as nutrition-focused.
pub const NUTRITION_KEYWORDS: [&str; 16] = [
    "calorie",
    "calories",
    "fat",
    "protein",
    "caffeine",
    "sugar",
    "carb",
    "carbohydrate",
    "diet",
    "healthy",
    "low",
    "high",
    "nutrition",
    "nutritional",
    "energy",
    "vitamin",
];

pub const DESCRIPTION_HEADER: &str = "Relevant Drinks Based on Your Request:";
pub const NUTRITION_HEADER: &str = "Nutritionally Similar Options:";

/// Whether `message` should also trigger a nutrition-facet search.
pub fn contains_nutrition_keywords(message: &str) -> bool {
    let lower = message.to_lowercase();
    NUTRITION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Builds menu context text from similarity search results.
pub struct ContextAssembler {
    search: Arc<dyn SimilaritySearch>,
    catalog: Arc<dyn CatalogStore>,
    description_k: usize,
    nutrition_k: usize,
}

impl ContextAssembler {
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        catalog: Arc<dyn CatalogStore>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            search,
            catalog,
            description_k: retrieval.description_k,
            nutrition_k: retrieval.nutrition_k,
        }
    }

    /// Context for `user_message`; empty when neither facet found anything.
    ///
    /// Errors only when the catalog store fails.
    pub async fn assemble(&self, user_message: &str) -> Result<String> {
        let mut context = String::new();

        let drinks = self
            .similar_drinks(user_message, Facet::Description, self.description_k)
            .await?;
        if !drinks.is_empty() {
            context.push_str(DESCRIPTION_HEADER);
            context.push('\n');
            context.push_str(&format_drinks_for_ai(&drinks));
            context.push('\n');
        }

        if contains_nutrition_keywords(user_message) {
            let drinks = self
                .similar_drinks(user_message, Facet::Nutrition, self.nutrition_k)
                .await?;
            if !drinks.is_empty() {
                context.push_str(NUTRITION_HEADER);
                context.push('\n');
                context.push_str(&format_drinks_for_ai(&drinks));
                context.push('\n');
            }
        }

        debug!(chars = context.len(), "assembled menu context");
        Ok(context)
    }

    /// Search one facet and resolve the hits to catalog records.
    ///
    /// Duplicate ids are dropped, keeping the first (best-ranked) one.
    /// Search errors degrade to an empty list; catalog errors propagate.
    async fn similar_drinks(
        &self,
        query: &str,
        facet: Facet,
        limit: usize,
    ) -> Result<Vec<MenuItem>> {
        let matches = match self.search.search(query, facet, limit).await {
            Ok(m) => m,
            Err(e) => {
                warn!(%facet, error = %e, "similarity search failed; continuing without it");
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let ids: Vec<i64> = matches
            .iter()
            .map(|m| m.item_id)
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = self
            .catalog
            .find_by_ids(&ids)
            .await
            .with_context(|| format!("failed to resolve {} drinks", facet))?;
        debug!(%facet, found = items.len(), "resolved similar drinks");
        Ok(items)
    }
}
