//! Library root for `oncall-bot`.
//!
//! Oncall-bot is a Slack assistant for on-call engineers designed to:
//! - Answer general technical questions (`/ask-bolty`, mentions, direct messages).
//! - Resolve incidents from a knowledge base of runbooks (`/incident`).
//! - Analyze code through MCP tool servers (`/code`).
//!
//! The bot integrates with Slack for chat, SurrealDB for preferences and the
//! vector index, and Anthropic or OpenAI for responses. The architecture is
//! built around extensible traits that allow for different implementations of
//! each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use service::{db::surreal::open_surreal_kv, rag::RagClient};
use tracing::{debug, info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the oncall-bot runtime:
/// - Initializes the crypto provider.
/// - Creates the runtime context, indexing the knowledge base.
/// - Starts the chat listener.
pub async fn start(config: Config) -> Void {
    info!("Starting oncall-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("A default crypto provider is already installed."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

/// Index the knowledge base and log what `query` retrieves.
///
/// Checks the document directory, the embedding credentials, and the ranking without connecting to Slack.
pub async fn diagnose(config: Config, query: &str) -> Void {
    info!("Diagnosing knowledge base retrieval ...");

    if config.openai_api_key.is_empty() {
        warn!("No OpenAI API key is configured; the knowledge base cannot be embedded.");
    }

    let db = open_surreal_kv(&config.db_path).await?;
    let rag = RagClient::surreal(&config, db);

    rag.initialize(&config.docs_directory).await;

    if !rag.is_ready() {
        return Err(anyhow::anyhow!("The knowledge base at `{}` could not be indexed.", config.docs_directory.display()));
    }

    let context = rag.retrieve_context(query).await;

    if context.is_empty() {
        warn!("No articles were retrieved for `{query}`.");
        return Ok(());
    }

    for (rank, source) in context.sources().iter().enumerate() {
        info!("{}. {} {}", rank + 1, source.filename, config.docs_url(&source.filename).unwrap_or_default());
    }

    debug!("Retrieved context:\n{}", context.context());

    Ok(())
}
