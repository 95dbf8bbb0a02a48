//! Beverage catalog: CSV ingestion and prompt rendering.
//!
//! The source CSV has one header row followed by 18 columns per drink:
//!
//! ```text
//! category, beverage, prep, calories, total fat, trans fat, saturated fat,
//! sodium, carbohydrates, cholesterol, fibre, sugars, protein,
//! vitamin A, vitamin C, calcium, iron, caffeine
//! ```
//!
//! Empty cells and the literal `Varies` become unknown (`None`), never zero.
//! Numeric cells that do not parse are also treated as unknown.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::MenuItem;
use crate::search;
use crate::store::sqlite::SqliteStore;
use crate::store::CatalogStore;
use crate::{db, embedding, migrate};

/// Number of columns a catalog row must have to be loaded.
pub const CSV_COLUMNS: usize = 18;

/// Rendering used when a drink list is empty.
pub const NO_DRINKS_FOUND: &str = "No drinks found matching the criteria.";

fn is_unknown(raw: &str) -> bool {
    let value = raw.trim();
    value.is_empty() || value.eq_ignore_ascii_case("varies")
}

fn parse_int(raw: &str) -> Option<i64> {
    if is_unknown(raw) {
        return None;
    }
    raw.trim().parse().ok()
}

fn parse_decimal(raw: &str) -> Option<f64> {
    if is_unknown(raw) {
        return None;
    }
    raw.trim().parse().ok()
}

fn parse_text(raw: &str) -> Option<String> {
    if is_unknown(raw) {
        return None;
    }
    Some(raw.trim().to_string())
}

/// Map one CSV record onto a [`MenuItem`]. Returns `None` for short rows.
pub fn item_from_record(record: &csv::StringRecord) -> Option<MenuItem> {
    if record.len() < CSV_COLUMNS {
        return None;
    }
    let field = |i: usize| record.get(i).unwrap_or("");

    Some(MenuItem {
        id: 0,
        category: field(0).trim().to_string(),
        name: field(1).trim().to_string(),
        prep: field(2).trim().to_string(),
        calories: parse_int(field(3)),
        total_fat: parse_decimal(field(4)),
        trans_fat: parse_decimal(field(5)),
        saturated_fat: parse_decimal(field(6)),
        sodium: parse_int(field(7)),
        total_carbohydrates: parse_int(field(8)),
        cholesterol: parse_int(field(9)),
        dietary_fibre: parse_int(field(10)),
        sugars: parse_int(field(11)),
        protein: parse_decimal(field(12)),
        vitamin_a: parse_text(field(13)),
        vitamin_c: parse_text(field(14)),
        calcium: parse_text(field(15)),
        iron: parse_text(field(16)),
        caffeine: parse_int(field(17)),
    })
}

/// Parse catalog CSV from any reader. The first row is treated as a header.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Vec<MenuItem>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut items = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;
        match item_from_record(&record) {
            Some(item) => items.push(item),
            None => debug!(line = line + 1, columns = record.len(), "skipping short row"),
        }
    }
    Ok(items)
}

/// Insert parsed items and return them with their assigned ids.
pub async fn store_items(store: &dyn CatalogStore, items: Vec<MenuItem>) -> Result<Vec<MenuItem>> {
    let mut stored = Vec::with_capacity(items.len());
    for (i, mut item) in items.into_iter().enumerate() {
        item.id = store.insert_item(&item).await?;
        stored.push(item);
        if (i + 1) % 50 == 0 {
            debug!(processed = i + 1, "storing catalog");
        }
    }
    Ok(stored)
}

fn display_int(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string())
}

fn display_decimal(v: Option<f64>) -> String {
    v.map(|n| format!("{:.1}", n))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Render drinks as the text block injected into the model prompt.
///
/// One bullet per drink with name, preparation and category, then a
/// nutrition sub-line. An empty list renders as [`NO_DRINKS_FOUND`].
pub fn format_drinks_for_ai(drinks: &[MenuItem]) -> String {
    if drinks.is_empty() {
        return NO_DRINKS_FOUND.to_string();
    }

    let mut out = format!("Found {} drinks:\n\n", drinks.len());
    for drink in drinks {
        out.push_str(&format!(
            "• {} ({}) - Category: {}\n  Nutrition: {} cal, {}mg caffeine, {}g fat, {}g protein\n\n",
            drink.name,
            drink.prep,
            drink.category,
            display_int(drink.calories),
            display_int(drink.caffeine),
            display_decimal(drink.total_fat),
            display_decimal(drink.protein),
        ));
    }
    out
}

// ============ CLI ============

/// CLI entry point for `menuchat load`: ingest the CSV and index embeddings.
pub async fn run_load(config: &Config, path: Option<&Path>, replace: bool) -> Result<()> {
    let path = path
        .or(config.catalog.csv_path.as_deref())
        .context("No CSV path given and [catalog].csv_path is not set")?;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open catalog CSV: {}", path.display()))?;
    let items = parse_catalog(file)?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    if replace {
        store.clear_catalog().await?;
    }

    let stored = store_items(store.as_ref(), items).await?;
    info!(count = stored.len(), path = %path.display(), "catalog loaded");

    let mut indexed = 0usize;
    if config.embedding.is_enabled() {
        match embedding::create_provider(&config.embedding) {
            Ok(provider) => {
                indexed = search::index_items(
                    provider.as_ref(),
                    store.as_ref(),
                    &stored,
                    config.embedding.batch_size,
                )
                .await?;
            }
            Err(e) => warn!(error = %e, "could not create embedding provider; skipping indexing"),
        }
    }

    println!("load {}", path.display());
    println!("  drinks loaded: {}", stored.len());
    println!("  vectors written: {}", indexed);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// CLI entry point for `menuchat drinks`: list the catalog or one category.
pub async fn run_drinks(config: &Config, category: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let drinks = match category {
        Some(c) => store.find_by_category(c).await?,
        None => store.find_all().await?,
    };
    print!("{}", format_drinks_for_ai(&drinks));

    store.pool().close().await;
    Ok(())
}
