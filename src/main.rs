//! # Menu Chat CLI (`menuchat`)
//!
//! ## Usage
//!
//! ```bash
//! menuchat --config ./config/menuchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `menuchat init` | Create the SQLite database and run schema migrations |
//! | `menuchat load [csv]` | Load the drink catalog and index embeddings |
//! | `menuchat drinks` | List the catalog, optionally one category |
//! | `menuchat search "<query>"` | Similarity search over one facet |
//! | `menuchat ask "<message>"` | Run one chat turn |
//! | `menuchat history <token>` | Print a session's messages |
//! | `menuchat serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` to adjust (default `menu_chat=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use menu_chat::{catalog, chat, config, migrate, search, server};

/// Menu Chat: a conversational beverage-menu assistant.
#[derive(Parser)]
#[command(
    name = "menuchat",
    about = "Menu Chat: a conversational beverage-menu assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/menuchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Load drinks from a CSV file and index their embeddings.
    ///
    /// Falls back to `[catalog].csv_path` when no path is given.
    Load {
        path: Option<PathBuf>,

        /// Delete the existing catalog (and its vectors) first.
        #[arg(long)]
        replace: bool,
    },

    /// List drinks in the catalog.
    Drinks {
        #[arg(long)]
        category: Option<String>,
    },

    /// Similarity search over the catalog.
    Search {
        query: String,

        /// `description` or `nutrition`.
        #[arg(long, default_value = "description")]
        facet: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Send one message and print the assistant's reply.
    Ask {
        message: String,

        /// Continue an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },

    /// Print the messages of a session.
    History { token: String },

    /// Start the HTTP chat server.
    Serve,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("menu_chat=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Load { path, replace } => {
            catalog::run_load(&cfg, path.as_deref(), replace).await?;
        }
        Commands::Drinks { category } => {
            catalog::run_drinks(&cfg, category.as_deref()).await?;
        }
        Commands::Search {
            query,
            facet,
            limit,
        } => {
            search::run_search(&cfg, &query, &facet, limit).await?;
        }
        Commands::Ask { message, session } => {
            chat::run_ask(&cfg, session.as_deref(), &message).await?;
        }
        Commands::History { token } => {
            chat::run_history(&cfg, &token).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
