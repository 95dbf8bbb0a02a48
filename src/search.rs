//! Similarity search gateway over the two catalog facets.
//!
//! The conversation pipeline only sees the [`SimilaritySearch`] trait.
//! [`VectorSearch`] is the local implementation: it embeds the query with
//! the configured provider and ranks the stored vectors of one facet by
//! cosine similarity (brute force, which is plenty for a menu-sized
//! catalog). [`DisabledSearch`] stands in when no embedding provider is
//! configured.
//!
//! Indexing lives here too: [`facet_text`] renders what gets embedded for
//! each facet and [`index_items`] writes the vectors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::{self, cosine_similarity, EmbeddingProvider};
use crate::models::{Facet, MenuItem, SimilarityMatch};
use crate::store::sqlite::SqliteStore;
use crate::store::{CatalogStore, VectorStore};
use crate::{catalog, db};

/// Ranked lookup of catalog items by free text.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Up to `limit` matches for `query` under `facet`, best first.
    async fn search(&self, query: &str, facet: Facet, limit: usize)
        -> Result<Vec<SimilarityMatch>>;
}

/// Embedding-backed search over vectors held in a [`VectorStore`].
///
/// Stored vectors whose length differs from the provider's `dims()` (left
/// over from a different model) are ignored.
pub struct VectorSearch {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
}

impl VectorSearch {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { provider, vectors }
    }
}

#[async_trait]
impl SimilaritySearch for VectorSearch {
    async fn search(
        &self,
        query: &str,
        facet: Facet,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let dims = self.provider.dims();
        let query_vec = embedding::embed_query(self.provider.as_ref(), query).await?;
        if query_vec.len() != dims {
            bail!(
                "query embedding has {} dimensions, expected {}",
                query_vec.len(),
                dims
            );
        }
        let stored = self.vectors.vectors_for_facet(facet).await?;

        let mut matches: Vec<SimilarityMatch> = stored
            .iter()
            .filter(|v| v.vector.len() == dims)
            .map(|v| SimilarityMatch {
                item_id: v.item_id,
                score: cosine_similarity(&query_vec, &v.vector),
                facet,
            })
            .collect();

        // Score desc, then id asc for a deterministic order
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        matches.truncate(limit);

        debug!(%facet, candidates = stored.len(), returned = matches.len(), "vector search");
        Ok(matches)
    }
}

/// Search gateway used when embeddings are disabled. Always errors.
pub struct DisabledSearch;

#[async_trait]
impl SimilaritySearch for DisabledSearch {
    async fn search(
        &self,
        _query: &str,
        _facet: Facet,
        _limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        bail!("similarity search requires embeddings; set [embedding] provider in config")
    }
}

/// Build the search gateway the configuration asks for.
pub fn create_search(
    config: &Config,
    vectors: Arc<dyn VectorStore>,
) -> Result<Arc<dyn SimilaritySearch>> {
    if !config.embedding.is_enabled() {
        return Ok(Arc::new(DisabledSearch));
    }
    let provider = embedding::create_provider(&config.embedding)?;
    Ok(Arc::new(VectorSearch::new(provider, vectors)))
}

// ============ Indexing ============

/// The text embedded for `item` under `facet`.
///
/// Unknown nutrition values are indexed as zero; the catalog itself keeps
/// them unknown.
pub fn facet_text(item: &MenuItem, facet: Facet) -> String {
    match facet {
        Facet::Description => format!("{} {} {}", item.category, item.name, item.prep),
        Facet::Nutrition => format!(
            "calories: {}, fat: {:.1}g, protein: {:.1}g, caffeine: {}mg, sugars: {}g",
            item.calories.unwrap_or(0),
            item.total_fat.unwrap_or(0.0),
            item.protein.unwrap_or(0.0),
            item.caffeine.unwrap_or(0),
            item.sugars.unwrap_or(0),
        ),
    }
}

/// Embed and store both facets for every item, `batch_size` texts per call.
///
/// A failed batch, or a vector whose length is not the provider's `dims()`,
/// is logged and skipped; returns the number of vectors written.
pub async fn index_items(
    provider: &dyn EmbeddingProvider,
    vectors: &dyn VectorStore,
    items: &[MenuItem],
    batch_size: usize,
) -> Result<usize> {
    let mut written = 0usize;

    for facet in [Facet::Description, Facet::Nutrition] {
        for batch in items.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|i| facet_text(i, facet)).collect();
            let embedded = match provider.embed(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(%facet, error = %e, "embedding batch failed");
                    continue;
                }
            };

            for ((item, text), vector) in batch.iter().zip(texts.iter()).zip(embedded.iter()) {
                if vector.len() != provider.dims() {
                    warn!(
                        %facet,
                        item = item.id,
                        got = vector.len(),
                        expected = provider.dims(),
                        "embedding has wrong dimensions; skipping"
                    );
                    continue;
                }
                vectors
                    .upsert_vector(item.id, facet, text, vector, provider.model_name())
                    .await?;
                written += 1;
            }
        }
    }

    info!(items = items.len(), vectors = written, "indexed catalog");
    Ok(written)
}

// ============ CLI ============

/// CLI entry point for `menuchat search`: prints the matched drinks.
pub async fn run_search(
    config: &Config,
    query: &str,
    facet: &str,
    limit: Option<usize>,
) -> Result<()> {
    let facet = match Facet::parse(facet) {
        Some(f) => f,
        None => bail!("Unknown facet: {}. Use description or nutrition.", facet),
    };
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let limit = limit.unwrap_or(match facet {
        Facet::Description => config.retrieval.description_k,
        Facet::Nutrition => config.retrieval.nutrition_k,
    });

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let search = create_search(config, store.clone())?;

    let matches = search.search(query, facet, limit).await?;
    let ids: Vec<i64> = matches.iter().map(|m| m.item_id).collect();
    let items = store.find_by_ids(&ids).await?;

    print!("{}", catalog::format_drinks_for_ai(&items));
    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    /// Embeds text as a 2-d vector: (mentions "latte", mentions "tea").
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("latte") { 1.0 } else { 0.0 },
                        if t.contains("tea") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    /// Claims three dimensions but produces two.
    struct MisreportingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MisreportingEmbedder {
        fn model_name(&self) -> &str {
            "misreporting"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            KeywordEmbedder.embed(texts).await
        }
    }

    async fn seeded_store() -> (Arc<InMemoryStore>, Vec<MenuItem>) {
        let store = Arc::new(InMemoryStore::new());
        let mut items = Vec::new();
        for (cat, name) in [("Tazo Tea", "Green Tea"), ("Espresso", "Caffè Latte")] {
            let mut item = MenuItem::named(cat, name, "Tall");
            item.id = store.insert_item(&item).await.unwrap();
            items.push(item);
        }
        (store, items)
    }

    #[test]
    fn test_facet_text_description() {
        let item = MenuItem::named("Classic Espresso Drinks", "Caffè Latte", "Short Nonfat Milk");
        assert_eq!(
            facet_text(&item, Facet::Description),
            "Classic Espresso Drinks Caffè Latte Short Nonfat Milk"
        );
    }

    #[test]
    fn test_facet_text_nutrition_zero_for_unknown() {
        let mut item = MenuItem::named("Coffee", "Brewed Coffee", "Short");
        item.calories = Some(3);
        item.total_fat = Some(0.1);
        assert_eq!(
            facet_text(&item, Facet::Nutrition),
            "calories: 3, fat: 0.1g, protein: 0.0g, caffeine: 0mg, sugars: 0g"
        );
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_similarity() {
        let (store, items) = seeded_store().await;
        index_items(&KeywordEmbedder, store.as_ref(), &items, 1)
            .await
            .unwrap();

        let search = VectorSearch::new(Arc::new(KeywordEmbedder), store.clone());
        let matches = search
            .search("a latte please", Facet::Description, 1)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item_id, items[1].id);
        assert_eq!(matches[0].facet, Facet::Description);
    }

    #[tokio::test]
    async fn test_vector_search_empty_query_returns_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let search = VectorSearch::new(Arc::new(KeywordEmbedder), store);
        assert!(search
            .search("   ", Facet::Description, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_disabled_search_errors() {
        assert!(DisabledSearch
            .search("latte", Facet::Description, 8)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_index_skips_vectors_of_wrong_dimension() {
        let (store, items) = seeded_store().await;
        let written = index_items(&MisreportingEmbedder, store.as_ref(), &items, 8)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(store
            .vectors_for_facet(Facet::Description)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_query_of_wrong_dimension_errors() {
        let (store, items) = seeded_store().await;
        index_items(&KeywordEmbedder, store.as_ref(), &items, 8)
            .await
            .unwrap();

        let search = VectorSearch::new(Arc::new(MisreportingEmbedder), store);
        let err = search
            .search("latte", Facet::Description, 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[tokio::test]
    async fn test_stale_vectors_from_other_model_ignored() {
        let (store, items) = seeded_store().await;
        index_items(&KeywordEmbedder, store.as_ref(), &items, 8)
            .await
            .unwrap();
        // Replace the tea vector with a 4-d one, as if from an earlier model
        store
            .upsert_vector(items[0].id, Facet::Description, "old", &[1.0; 4], "old-model")
            .await
            .unwrap();

        let search = VectorSearch::new(Arc::new(KeywordEmbedder), store);
        let matches = search
            .search("green tea", Facet::Description, 5)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item_id, items[1].id);
    }
}
