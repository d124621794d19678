//! Parley command-line interface
//!
//! Thin wrapper over the engine's caller-facing surface: ask a question,
//! inspect or clear a session's history, and show store counters.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;

use parley_engine::agent::SupportAgent;
use parley_engine::cache::QueryCache;
use parley_engine::classifier::KeywordClassifier;
use parley_engine::config::Config;
use parley_engine::db::Database;
use parley_engine::memory::ConversationMemory;
use parley_engine::provider::GeminiProvider;
use parley_engine::telemetry;
use parley_engine::tools::ToolRegistry;
use parley_engine::vector::ChromaStore;

#[derive(Parser)]
#[command(name = "parley", about = "Retrieval-augmented community support agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question
    Ask {
        /// The question text
        query: String,

        /// Session to remember this exchange under
        #[arg(long)]
        session: Option<String>,

        /// Scoping context entries, key=value (repeatable)
        #[arg(long = "context", value_parser = parse_key_value)]
        context: Vec<(String, String)>,
    },

    /// Show a session's conversation history
    History {
        /// Session identifier
        session: String,
    },

    /// Clear a session's conversation history
    Clear {
        /// Session identifier
        session: String,
    },

    /// Show knowledge base and memory counters
    Status,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

async fn build_agent(config: &Config) -> Result<SupportAgent> {
    let api_key = config.provider_api_key().with_context(|| {
        format!(
            "provider API key not set; export {}",
            config.provider.api_key_env
        )
    })?;

    let db = Database::new(&config.db_path()).await?;
    let pool = db.pool().clone();
    let client = reqwest::Client::new();

    let classifier = Arc::new(KeywordClassifier::new()?);
    let cache = Arc::new(QueryCache::new(pool.clone(), config.cache.ttl_secs));
    let memory = Arc::new(ConversationMemory::new(
        pool,
        config.memory.message_limit,
        config.memory.conversation_ttl_secs,
    ));
    let tools = Arc::new(ToolRegistry::with_defaults(client.clone(), &config.tools)?);
    let provider = Arc::new(GeminiProvider::new(
        config.provider.clone(),
        api_key,
        client.clone(),
    ));
    let vector = Arc::new(ChromaStore::new(
        client,
        config.retrieval.base_url.clone(),
        config.retrieval.collection.clone(),
    ));

    Ok(SupportAgent::new(
        classifier, cache, memory, tools, provider, vector, config,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_create()?;
    telemetry::init_telemetry_with_level(&config.core.log_level);

    match cli.command {
        Command::Ask {
            query,
            session,
            context,
        } => {
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let scoping: BTreeMap<String, String> = context.into_iter().collect();

            let agent = build_agent(&config).await?;
            let response = agent.ask(&query, &session_id, scoping).await;

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!("\nSources:");
                for source in &response.sources {
                    match source.score {
                        Some(score) => {
                            println!("  - {} ({}) [{:.0}%]", source.title, source.locator, score * 100.0)
                        }
                        None => println!("  - {} ({})", source.title, source.locator),
                    }
                }
            }
            if response.cached {
                println!("\n(served from cache)");
            }
        }

        Command::History { session } => {
            let agent = build_agent(&config).await?;
            let turns = agent.history(&session).await?;

            if turns.is_empty() {
                println!("No history for session {}", session);
            }
            for turn in turns {
                println!("Q: {}", turn.query);
                println!("A: {}\n", turn.answer);
            }
        }

        Command::Clear { session } => {
            let agent = build_agent(&config).await?;
            let removed = agent.clear_history(&session).await?;
            println!("Removed {} turn(s) from session {}", removed, session);
        }

        Command::Status => {
            let agent = build_agent(&config).await?;
            let stats = agent.stats().await;
            println!("Documents: {}", stats.documents);
            println!("Sessions:  {}", stats.sessions);
            println!("Turns:     {}", stats.turns);
        }
    }

    Ok(())
}
