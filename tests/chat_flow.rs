//! End-to-end tests of the conversation pipeline over a real SQLite file.
//!
//! The embedding provider and completion gateway are replaced with
//! deterministic stand-ins; everything else (CSV parsing, storage, vector
//! ranking, context assembly, prompt layout) is the production code path.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use menu_chat::catalog::{parse_catalog, store_items};
use menu_chat::chat::ChatService;
use menu_chat::completion::{CompletionError, CompletionGateway};
use menu_chat::config::{load_config, Config};
use menu_chat::context::ContextAssembler;
use menu_chat::embedding::EmbeddingProvider;
use menu_chat::error::ChatError;
use menu_chat::models::Role;
use menu_chat::prompt::PromptBuilder;
use menu_chat::search::{index_items, VectorSearch};
use menu_chat::store::sqlite::SqliteStore;
use menu_chat::store::{CatalogStore, ConversationStore};
use menu_chat::{db, migrate};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CATALOG_CSV: &str = "\
Beverage_category,Beverage,Beverage_prep,Calories,Total Fat (g),Trans Fat (g),Saturated Fat (g),Sodium (mg),Total Carbohydrates (g),Cholesterol (mg),Dietary Fibre (g),Sugars (g),Protein (g),Vitamin A (% DV),Vitamin C (% DV),Calcium (% DV),Iron (% DV),Caffeine (mg)
Coffee,Brewed Coffee,Short,3,0.1,0,0,0,5,0,0,0,0.3,0%,0%,0%,0%,175
Classic Espresso Drinks,Caffè Latte,Tall Nonfat Milk,100,0.2,0,0,5,75,15,0,14,10,10%,0%,30%,0%,75
Tazo Tea Drinks,Tazo Tea,Grande,0,0,0,0,0,0,0,0,0,0,0%,0%,0%,0%,Varies
";

// ─── Stand-ins ──────────────────────────────────────────────────────

/// Embeds text as (mentions latte, mentions tea, mentions coffee).
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                ["latte", "tea", "coffee"]
                    .iter()
                    .map(|k| if t.contains(k) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// Echoes a numbered reply and keeps every prompt.
#[derive(Default)]
struct RecordingCompletion {
    prompts: Mutex<Vec<String>>,
}

impl RecordingCompletion {
    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CompletionGateway for RecordingCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!("reply {}", prompts.len()))
    }
}

struct FailingCompletion;

#[async_trait]
impl CompletionGateway for FailingCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

// ─── Setup ──────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let path = tmp.path().join("menuchat.toml");
    std::fs::write(
        &path,
        format!(
            r#"[db]
path = "{}/data/menuchat.sqlite"

[server]
bind = "127.0.0.1:0"
"#,
            tmp.path().display()
        ),
    )
    .unwrap();
    load_config(&path).unwrap()
}

async fn loaded_store(config: &Config) -> Arc<SqliteStore> {
    let pool = db::connect(config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));

    let items = parse_catalog(CATALOG_CSV.as_bytes()).unwrap();
    let stored = store_items(store.as_ref(), items).await.unwrap();
    let written = index_items(&KeywordEmbedder, store.as_ref(), &stored, 2)
        .await
        .unwrap();
    assert_eq!(written, 6);
    store
}

fn service(
    config: &Config,
    store: Arc<SqliteStore>,
    completion: Arc<dyn CompletionGateway>,
) -> ChatService {
    let search = Arc::new(VectorSearch::new(Arc::new(KeywordEmbedder), store.clone()));
    let assembler = ContextAssembler::new(search, store.clone(), &config.retrieval);
    let prompts = PromptBuilder::new(config.retrieval.history_window);
    ChatService::new(store, assembler, prompts, completion)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_latte_question_gets_ranked_context() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;
    let llm = Arc::new(RecordingCompletion::default());
    let svc = service(&config, store.clone(), llm.clone());

    let reply = svc.handle_message("t1", "I'd like a latte").await.unwrap();
    assert_eq!(reply, "reply 1");

    let prompt = llm.last_prompt();
    let context = prompt
        .split("Current Menu Context:\n")
        .nth(1)
        .expect("context block present");
    assert!(context.starts_with(
        "Relevant Drinks Based on Your Request:\nFound 3 drinks:\n\n• Caffè Latte"
    ));
    assert!(!prompt.contains("Nutritionally Similar Options:"));
    assert!(prompt.ends_with("User: I'd like a latte\nAssistant:"));
}

#[tokio::test]
async fn test_nutrition_question_adds_second_block() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;
    let llm = Arc::new(RecordingCompletion::default());
    let svc = service(&config, store, llm.clone());

    svc.handle_message("t1", "low calorie tea please").await.unwrap();

    let prompt = llm.last_prompt();
    let description = prompt.find("Relevant Drinks Based on Your Request:").unwrap();
    let nutrition = prompt.find("Nutritionally Similar Options:").unwrap();
    assert!(description < nutrition);
    assert!(prompt.contains(
        "• Tazo Tea (Grande) - Category: Tazo Tea Drinks\n  Nutrition: 0 cal, unknownmg caffeine"
    ));
}

#[tokio::test]
async fn test_conversation_persists_across_service_instances() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;

    let llm = Arc::new(RecordingCompletion::default());
    service(&config, store.clone(), llm.clone())
        .handle_message("t1", "hello")
        .await
        .unwrap();

    // A fresh service over the same database sees the earlier turn.
    let llm2 = Arc::new(RecordingCompletion::default());
    service(&config, store.clone(), llm2.clone())
        .handle_message("t1", "and a tea?")
        .await
        .unwrap();

    let prompt = llm2.last_prompt();
    assert!(prompt.contains(
        "Conversation History:\nUser: hello\nAssistant: reply 1\nUser: and a tea?\n\n"
    ));

    let session = store.find_session_by_token("t1").await.unwrap().unwrap();
    let messages = store.list_messages(session.id).await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_history_window_drops_oldest_turns() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;
    let llm = Arc::new(RecordingCompletion::default());
    let svc = service(&config, store, llm.clone());

    for i in 1..=5 {
        svc.handle_message("t1", &format!("message {}", i))
            .await
            .unwrap();
    }

    // Nine stored messages precede the final prompt; only the last six render.
    let prompt = llm.last_prompt();
    let history = prompt.split("Conversation History:\n").nth(1).unwrap();
    let history = &history[..history.find("\n\n").unwrap()];
    assert_eq!(
        history.lines().collect::<Vec<_>>(),
        vec![
            "Assistant: reply 2",
            "User: message 3",
            "Assistant: reply 3",
            "User: message 4",
            "Assistant: reply 4",
            "User: message 5",
        ]
    );
}

#[tokio::test]
async fn test_gateway_failure_keeps_user_message_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;
    let svc = service(&config, store.clone(), Arc::new(FailingCompletion));

    let err = svc.handle_message("t1", "hello").await.unwrap_err();
    assert!(matches!(err, ChatError::Gateway(_)));
    assert!(err.to_string().contains("503"));

    let messages = svc.history("t1").await.unwrap().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn test_concurrent_first_messages_share_one_session() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create_session("shared").await.unwrap().id
        }));
    }
    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap());
    }

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.count_sessions().await.unwrap(), 1);
}

#[tokio::test]
async fn test_equal_timestamps_keep_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;

    let session = store.get_or_create_session("t1").await.unwrap();
    let at = Utc::now();
    for text in ["a", "b", "c"] {
        store
            .append_message(session.id, Role::User, text, at)
            .await
            .unwrap();
    }

    let contents: Vec<String> = store
        .list_messages(session.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_unknown_values_survive_storage() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;

    let teas = store.find_by_category("tazo tea drinks").await.unwrap();
    assert_eq!(teas.len(), 1);
    assert_eq!(teas[0].caffeine, None);
    assert_eq!(teas[0].calories, Some(0));

    let coffee = store.find_by_category("Coffee").await.unwrap();
    assert_eq!(coffee[0].caffeine, Some(175));
    assert_eq!(coffee[0].protein, Some(0.3));
}

#[tokio::test]
async fn test_clear_catalog_removes_vectors() {
    use menu_chat::models::Facet;
    use menu_chat::store::VectorStore;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = loaded_store(&config).await;

    store.clear_catalog().await.unwrap();
    assert_eq!(store.count_items().await.unwrap(), 0);
    assert!(store
        .vectors_for_facet(Facet::Description)
        .await
        .unwrap()
        .is_empty());
}
