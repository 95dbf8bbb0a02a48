//! # Menu Chat
//!
//! A conversational assistant for a beverage menu.
//!
//! Each user message is answered by a language model whose prompt carries
//! the assistant persona, the drinks most relevant to the message, and a
//! window of the recent conversation. Sessions and messages are persisted
//! so a conversation can be resumed by token.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CSV menu │──▶│ Load + Embed │──▶│    SQLite     │
//! └──────────┘   └──────────────┘   │ drinks+vectors│
//!                                   └──────┬───────┘
//!                                          │
//!     user message ──▶ ChatService ◀───────┤ context
//!                       │   │              │
//!                       │   └──▶ prompt ──▶ completion gateway
//!                       ▼
//!                 sessions + messages
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! menuchat init                          # create database
//! menuchat load ./data/starbucks.csv     # load and index the menu
//! menuchat ask "something low in sugar"  # one-off question
//! menuchat serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Request-level error categories |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Catalog, conversation, and vector persistence |
//! | [`catalog`] | CSV ingestion and drink-list rendering |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`search`] | Per-facet similarity search and indexing |
//! | [`context`] | Menu context assembly |
//! | [`prompt`] | Prompt construction |
//! | [`completion`] | Completion gateway |
//! | [`chat`] | Conversation orchestration |
//! | [`server`] | HTTP API |

pub mod catalog;
pub mod chat;
pub mod completion;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod search;
pub mod server;
pub mod store;
