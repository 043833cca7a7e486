//! Slash command handling.

use serde_json::Value;
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ProviderResponse, Void},
    },
    interaction::{
        CommandEvent, DEFAULT_LOADING_TEXT, RAG_LOADING_TEXT, answer_blocks, error_fallback,
        format::{self, ResponseKind},
    },
    service::{agent::AgentClient, chat::ChatClient},
};

// Types.

/// The slash commands the bot answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    /// `/ask-bolty`: a general question, answered privately.
    Ask,
    /// `/incident`: incident response from the knowledge base.
    Incident,
    /// `/code`: code analysis with MCP tools.
    Code,
}

impl SlashCommand {
    pub fn parse(command: &str) -> Option<Self> {
        match command.trim() {
            "/ask-bolty" => Some(Self::Ask),
            "/incident" => Some(Self::Incident),
            "/code" => Some(Self::Code),
            _ => None,
        }
    }

    pub fn system_content(self, config: &Config) -> &str {
        match self {
            Self::Ask => &config.system_directive,
            Self::Incident => &config.incident_system_directive,
            Self::Code => &config.code_system_directive,
        }
    }

    pub fn use_rag(self) -> bool {
        matches!(self, Self::Ask | Self::Incident)
    }

    pub fn use_mcp(self) -> bool {
        matches!(self, Self::Code)
    }

    /// Ephemeral hint shown when the command has no text.
    pub fn empty_prompt_hint(self) -> &'static str {
        match self {
            Self::Ask => "Looks like you didn't provide a prompt. Try again.",
            Self::Incident => ":rotating_light: Please describe the incident or alert. Example: `/incident kafka backlog is growing`",
            Self::Code => ":mag: Please provide a code-related question. Example: `/code explain the authentication flow`",
        }
    }

    /// Public loading message; `/ask-bolty` replies privately and posts none.
    pub fn loading_text(self) -> Option<&'static str> {
        match self {
            Self::Ask => None,
            Self::Incident => Some(RAG_LOADING_TEXT),
            Self::Code => Some(DEFAULT_LOADING_TEXT),
        }
    }

    fn response_blocks(self, config: &Config, response: &ProviderResponse) -> Vec<Value> {
        match self {
            Self::Code => format::format_code_response(&response.response),
            Self::Ask | Self::Incident => answer_blocks(config, response, ResponseKind::General),
        }
    }
}

// Handlers.

#[instrument(skip_all)]
pub fn handle_command(event: CommandEvent, config: Config, agent: AgentClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the command.
        let result = respond_to_command(&event, &config, &agent, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling `{}`: {}", event.command, err);
        }
    });
}

/// Answer a slash command: a quoted prompt followed by the formatted answer or an error.
#[instrument(skip_all, fields(command = %event.command))]
pub async fn respond_to_command(event: &CommandEvent, config: &Config, agent: &AgentClient, chat: &ChatClient) -> Void {
    let Some(command) = SlashCommand::parse(&event.command) else {
        warn!("Received unsupported command.");
        return chat.post_ephemeral(&event.channel_id, &event.user_id, &format!("`{}` is not supported.", event.command), Vec::new()).await;
    };

    let prompt = event.text.trim();

    if prompt.is_empty() {
        return chat.post_ephemeral(&event.channel_id, &event.user_id, command.empty_prompt_hint(), Vec::new()).await;
    }

    // Show the question while the answer is generated.

    let waiting_ts = match command.loading_text() {
        Some(loading) => {
            let mut blocks = vec![format::prompt_quote_block(prompt)];
            blocks.extend(format::format_simple_message(loading, None));

            Some(chat.post_message(&event.channel_id, None, &format!("Q: {prompt}\n{loading}"), blocks).await?)
        }
        None => None,
    };

    // Generate the answer.

    let result = agent
        .get_response(&event.user_id, prompt, "", command.system_content(config), command.use_rag(), command.use_mcp())
        .await;

    let (text, blocks) = match result {
        Ok(response) => {
            info!(provider = %response.provider, sources = response.rag_sources.len(), "Answered command.");

            let mut blocks = vec![format::prompt_quote_block(prompt)];
            blocks.extend(command.response_blocks(config, &response));

            (format::fallback_text(prompt, &response.response), blocks)
        }
        Err(e) => {
            error!("Failed to answer command: {e}");
            (error_fallback(&e.to_string()), format::format_error_message(&e.to_string()))
        }
    };

    // Deliver.

    match waiting_ts {
        Some(ts) => chat.update_message(&event.channel_id, &ts, &text, blocks).await,
        None => chat.post_ephemeral(&event.channel_id, &event.user_id, &text, blocks).await,
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::base::config::ConfigInner;

    #[test]
    fn test_parse() {
        assert_eq!(SlashCommand::parse("/ask-bolty"), Some(SlashCommand::Ask));
        assert_eq!(SlashCommand::parse("/incident"), Some(SlashCommand::Incident));
        assert_eq!(SlashCommand::parse(" /code "), Some(SlashCommand::Code));
        assert_eq!(SlashCommand::parse("/deploy"), None);
    }

    #[test]
    fn test_routing() {
        assert!(SlashCommand::Incident.use_rag() && !SlashCommand::Incident.use_mcp());
        assert!(SlashCommand::Code.use_mcp() && !SlashCommand::Code.use_rag());
        assert!(SlashCommand::Ask.loading_text().is_none());
    }

    #[test]
    fn test_system_content_follows_config() {
        let config = Config {
            inner: Arc::new(ConfigInner {
                incident_system_directive: "Runbooks first.".to_string(),
                ..Default::default()
            }),
        };

        assert_eq!(SlashCommand::Incident.system_content(&config), "Runbooks first.");
        assert_eq!(SlashCommand::Code.system_content(&config), config.code_system_directive);
    }
}
