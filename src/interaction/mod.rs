//! Event handling and user interactions for the oncall-bot.
//!
//! This module turns chat events into answers:
//! - Slash commands (`/ask-bolty`, `/incident`, `/code`).
//! - App mentions in channels and threads.
//! - Direct messages.
//!
//! Each handler spawns its own task, so a slow completion never blocks the listener.

pub mod command;
pub mod conversation;
pub mod direct_message;
pub mod format;
pub mod mention;

use serde_json::Value;

use crate::base::{
    config::Config,
    types::{ProviderResponse, RagSource},
};

use format::ResponseKind;

/// Number of recent messages read for conversation context.
pub const CONVERSATION_LIMIT: u16 = 10;

/// Shown while an answer is being generated.
pub const DEFAULT_LOADING_TEXT: &str = "Thinking...";

/// Shown while `/incident` searches the knowledge base.
pub const RAG_LOADING_TEXT: &str = ":mag: Searching the knowledge base...";

/// Prefix of the fallback text for error replies.
pub const ERROR_PREFIX: &str = "Something went wrong!";

/// Reply to a mention that carries no question.
pub const MENTION_WITHOUT_TEXT: &str = "Hi there! You didn't provide a message with your mention. Mention me again in this thread so that I can help you out!";

// Types.

/// A slash command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// The command, including the leading slash (e.g., `/incident`).
    pub command: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

/// A message addressed to the bot, either a mention or a direct message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub channel_id: String,
    pub user_id: String,
    pub ts: String,
    /// Set when the message was posted inside a thread.
    pub thread_ts: Option<String>,
    pub text: String,
}

// Helpers.

/// Attach a link to each cited document when the docs repository is configured.
pub fn attach_citation_urls(config: &Config, sources: &[RagSource]) -> Vec<RagSource> {
    sources
        .iter()
        .map(|source| RagSource {
            filename: source.filename.clone(),
            url: source.url.clone().or_else(|| config.docs_url(&source.filename)),
        })
        .collect()
}

/// Blocks for an answer: with citations when knowledge base articles were used.
pub fn answer_blocks(config: &Config, response: &ProviderResponse, kind: ResponseKind) -> Vec<Value> {
    if response.rag_sources.is_empty() {
        return format::format_ai_response(&response.response, kind);
    }

    format::format_rag_response(&response.response, &attach_citation_urls(config, &response.rag_sources))
}

/// Fallback text for an error reply.
pub fn error_fallback(error: &str) -> String {
    format::truncate_fallback(&format!("{ERROR_PREFIX}\n{error}"))
}

// Tests.
