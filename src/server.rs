//! Chat HTTP server.
//!
//! A thin JSON layer over [`ChatService`] and the catalog store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/session` | Mint a session token and return the greeting |
//! | `POST` | `/message` | Send one user message, receive the reply |
//! | `GET`  | `/session/{token}/messages` | Ordered history for a session |
//! | `GET`  | `/drinks` | Catalog listing, optionally `?category=` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request: message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `gateway_error` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat page
//! can be served from anywhere.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::chat::{self, ChatService};
use crate::config::Config;
use crate::error::ChatError;
use crate::models::{MenuItem, Message};
use crate::store::sqlite::SqliteStore;
use crate::store::CatalogStore;
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub catalog: Arc<dyn CatalogStore>,
    /// Text returned alongside every new session token.
    pub greeting: String,
}

/// Build the router with all routes and CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/session", post(handle_create_session))
        .route("/session/{token}/messages", get(handle_history))
        .route("/message", post(handle_message))
        .route("/drinks", get(handle_drinks))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve `state` on an already-bound listener until the process stops.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the chat server on `[server].bind`.
///
/// Runs migrations first so a fresh database is usable immediately.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let state = AppState {
        service: Arc::new(chat::build_service(config, store.clone())?),
        catalog: store,
        greeting: config.server.greeting.clone(),
    };

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "chat server listening");
    println!("Chat server listening on http://{}", config.server.bind);

    serve(listener, state).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let status = match err {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /session ============

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub token: String,
    pub greeting: String,
}

async fn handle_create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        token: state.service.create_session(),
        greeting: state.greeting.clone(),
    })
}

// ============ POST /message ============

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageRequest {
    pub token: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub token: String,
    pub reply: String,
}

/// Returns `400` for a malformed body or an empty token or text, and `502`
/// when the model call fails. In the latter case the user message has still
/// been stored.
async fn handle_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let reply = state.service.handle_message(&req.token, &req.text).await?;
    Ok(Json(MessageResponse {
        token: req.token,
        reply,
    }))
}

// ============ GET /session/{token}/messages ============

#[derive(Serialize)]
struct HistoryResponse {
    token: String,
    messages: Vec<Message>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let messages = state
        .service
        .history(&token)
        .await?
        .ok_or_else(|| not_found(format!("no session with token: {}", token)))?;
    Ok(Json(HistoryResponse { token, messages }))
}

// ============ GET /drinks ============

#[derive(Deserialize)]
struct DrinksQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct DrinksResponse {
    count: usize,
    drinks: Vec<MenuItem>,
}

async fn handle_drinks(
    State(state): State<AppState>,
    Query(query): Query<DrinksQuery>,
) -> Result<Json<DrinksResponse>, AppError> {
    let drinks = match query.category.as_deref() {
        Some(c) if !c.trim().is_empty() => state.catalog.find_by_category(c).await,
        _ => state.catalog.find_all().await,
    }
    .map_err(internal)?;

    Ok(Json(DrinksResponse {
        count: drinks.len(),
        drinks,
    }))
}
