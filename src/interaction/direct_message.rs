use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::{config::Config, types::Void},
    interaction::{
        CONVERSATION_LIMIT, ChatEvent, DEFAULT_LOADING_TEXT, answer_blocks,
        conversation::{parse_conversation, strip_mention},
        error_fallback,
        format::{self, ResponseKind},
    },
    service::{agent::AgentClient, chat::ChatClient},
};

#[instrument(skip_all)]
pub fn handle_direct_message(event: ChatEvent, config: Config, agent: AgentClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = respond_to_direct_message(&event, &config, &agent, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling direct message: {}", err);
        }
    });
}

/// Answer a direct message with the DM instructions; thread replies carry the thread as context.
#[instrument(skip_all, fields(channel = %event.channel_id))]
pub async fn respond_to_direct_message(event: &ChatEvent, config: &Config, agent: &AgentClient, chat: &ChatClient) -> Void {
    let prompt = strip_mention(&event.text, chat.bot_user_id());

    if prompt.is_empty() {
        debug!("Skipping direct message without text.");
        return Ok(());
    }

    let history = match event.thread_ts.as_deref() {
        Some(thread_ts) => match chat.get_conversation(&event.channel_id, Some(thread_ts), CONVERSATION_LIMIT).await {
            Ok(messages) => parse_conversation(&messages, &event.ts),
            Err(e) => {
                warn!("Could not read thread context: {e}");
                String::new()
            }
        },
        None => String::new(),
    };

    let waiting_ts = chat.post_message(&event.channel_id, event.thread_ts.as_deref(), DEFAULT_LOADING_TEXT, Vec::new()).await?;

    let (text, blocks) = match agent.get_response(&event.user_id, &prompt, &history, &config.dm_system_directive, true, false).await {
        Ok(response) => {
            info!(provider = %response.provider, sources = response.rag_sources.len(), "Answered direct message.");
            (format::truncate_fallback(&response.response), answer_blocks(config, &response, ResponseKind::DirectMessage))
        }
        Err(e) => {
            error!("Failed to answer direct message: {e}");
            (error_fallback(&e.to_string()), format::format_error_message(&e.to_string()))
        }
    };

    chat.update_message(&event.channel_id, &waiting_ts, &text, blocks).await
}
