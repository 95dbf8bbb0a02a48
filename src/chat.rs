//! Conversation orchestration.
//!
//! [`ChatService`] owns the per-message lifecycle:
//!
//! 1. get-or-create the session for the token
//! 2. persist the user message
//! 3. load the full ordered history (which now includes that message)
//! 4. assemble menu context
//! 5. build the prompt
//! 6. call the completion gateway
//! 7. persist the assistant reply
//! 8. return the reply
//!
//! Nothing is rolled back on failure. If the gateway fails, the user message
//! stays persisted so a retry sees an accurate history. Any storage failure
//! (session, messages, or the catalog lookup behind the menu context) ends
//! the turn before the gateway is called.
//!
//! Sessions are created lazily: [`ChatService::create_session`] only mints a
//! token, and the row appears on the first message that carries it.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::completion::{self, CompletionGateway};
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::error::{ChatError, ChatResult};
use crate::models::{Message, Role};
use crate::prompt::PromptBuilder;
use crate::search;
use crate::store::sqlite::SqliteStore;
use crate::store::ConversationStore;
use crate::{db, migrate};

/// Conversation orchestrator. Cheap to share behind an `Arc`.
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    assembler: ContextAssembler,
    prompts: PromptBuilder,
    completion: Arc<dyn CompletionGateway>,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        assembler: ContextAssembler,
        prompts: PromptBuilder,
        completion: Arc<dyn CompletionGateway>,
    ) -> Self {
        Self {
            conversations,
            assembler,
            prompts,
            completion,
        }
    }

    /// Mint a fresh session token. No row is written.
    pub fn create_session(&self) -> String {
        let token = Uuid::new_v4().to_string();
        info!(session = %token, "generated session token");
        token
    }

    /// Run one user turn and return the model's reply verbatim.
    pub async fn handle_message(&self, token: &str, user_message: &str) -> ChatResult<String> {
        validate(token, user_message)?;
        info!(session = %token, chars = user_message.len(), "handling message");

        let result = self.run_turn(token, user_message).await;
        if let Err(ref e) = result {
            error!(session = %token, error = %e, "chat turn failed");
        }
        result
    }

    async fn run_turn(&self, token: &str, user_message: &str) -> ChatResult<String> {
        let session = self
            .conversations
            .get_or_create_session(token)
            .await
            .map_err(ChatError::Persistence)?;
        debug!(session = %token, id = session.id, "resolved session");

        self.conversations
            .append_message(session.id, Role::User, user_message, Utc::now())
            .await
            .map_err(ChatError::Persistence)?;

        let history = self
            .conversations
            .list_messages(session.id)
            .await
            .map_err(ChatError::Persistence)?;
        debug!(session = %token, messages = history.len(), "loaded history");

        let context = self
            .assembler
            .assemble(user_message)
            .await
            .map_err(ChatError::Persistence)?;

        // The saved user message is already the last history entry; it is
        // rendered again as the explicit final turn.
        let prompt = self.prompts.build(&history, &context, user_message);
        debug!(session = %token, chars = prompt.len(), "built prompt");

        let reply = self
            .completion
            .complete(&prompt)
            .await
            .map_err(|e| ChatError::Gateway(e.to_string()))?;
        info!(session = %token, chars = reply.len(), "received reply");

        self.conversations
            .append_message(session.id, Role::Assistant, &reply, Utc::now())
            .await
            .map_err(ChatError::Persistence)?;

        Ok(reply)
    }

    /// Ordered history for a token, or `None` if no message has used it yet.
    pub async fn history(&self, token: &str) -> ChatResult<Option<Vec<Message>>> {
        if token.trim().is_empty() {
            return Err(ChatError::Validation("session token must not be empty".into()));
        }
        let session = self
            .conversations
            .find_session_by_token(token)
            .await
            .map_err(ChatError::Persistence)?;
        match session {
            Some(s) => self
                .conversations
                .list_messages(s.id)
                .await
                .map(Some)
                .map_err(ChatError::Persistence),
            None => Ok(None),
        }
    }
}

/// Wire a [`ChatService`] over one SQLite store using the configured gateways.
pub fn build_service(config: &Config, store: Arc<SqliteStore>) -> Result<ChatService> {
    let search = search::create_search(config, store.clone())?;
    let assembler = ContextAssembler::new(search, store.clone(), &config.retrieval);
    let prompts = PromptBuilder::new(config.retrieval.history_window);
    let completion = completion::create_completion(&config.completion)?;
    Ok(ChatService::new(store, assembler, prompts, completion))
}

fn validate(token: &str, user_message: &str) -> ChatResult<()> {
    if token.trim().is_empty() {
        return Err(ChatError::Validation("session token must not be empty".into()));
    }
    if user_message.trim().is_empty() {
        return Err(ChatError::Validation("message must not be empty".into()));
    }
    Ok(())
}

// ============ CLI ============

/// CLI entry point for `menuchat ask`: one turn, reply on stdout.
///
/// Without `--session` a fresh token is minted and printed so the
/// conversation can be continued.
pub async fn run_ask(config: &Config, session: Option<&str>, message: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let service = build_service(config, store.clone())?;

    let token = match session {
        Some(t) => t.to_string(),
        None => {
            let t = service.create_session();
            println!("session: {}", t);
            t
        }
    };

    let reply = service.handle_message(&token, message).await;
    store.pool().close().await;
    println!("{}", reply?);
    Ok(())
}

/// CLI entry point for `menuchat history`: print a session's messages.
pub async fn run_history(config: &Config, token: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let session = store.find_session_by_token(token).await?;
    let Some(session) = session else {
        store.pool().close().await;
        anyhow::bail!("session not found: {}", token);
    };
    let messages = store.list_messages(session.id).await?;
    store.pool().close().await;

    for msg in &messages {
        println!(
            "[{}] {}: {}",
            msg.created_at.format("%Y-%m-%d %H:%M:%S"),
            msg.role.label(),
            msg.content
        );
    }
    if messages.is_empty() {
        println!("(no messages)");
    }
    Ok(())
}
