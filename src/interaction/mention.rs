use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{config::Config, types::Void},
    interaction::{
        CONVERSATION_LIMIT, ChatEvent, DEFAULT_LOADING_TEXT, MENTION_WITHOUT_TEXT, answer_blocks,
        conversation::{parse_conversation, strip_mention},
        error_fallback,
        format::{self, ResponseKind},
    },
    service::{agent::AgentClient, chat::ChatClient},
};

#[instrument(skip_all)]
pub fn handle_app_mention(event: ChatEvent, config: Config, agent: AgentClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = respond_to_mention(&event, &config, &agent, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling app mention: {}", err);
        }
    });
}

/// Answer a mention in its thread (starting one on a top-level message), using recent messages as context.
#[instrument(skip_all, fields(channel = %event.channel_id))]
pub async fn respond_to_mention(event: &ChatEvent, config: &Config, agent: &AgentClient, chat: &ChatClient) -> Void {
    let thread_ts = event.thread_ts.as_deref().unwrap_or(&event.ts);
    let prompt = strip_mention(&event.text, chat.bot_user_id());

    if prompt.is_empty() {
        chat.post_message(&event.channel_id, Some(thread_ts), MENTION_WITHOUT_TEXT, Vec::new()).await?;
        return Ok(());
    }

    // Thread replies when in a thread, otherwise the channel's recent history.

    let history = match chat.get_conversation(&event.channel_id, event.thread_ts.as_deref(), CONVERSATION_LIMIT).await {
        Ok(messages) => parse_conversation(&messages, &event.ts),
        Err(e) => {
            warn!("Could not read conversation context: {e}");
            String::new()
        }
    };

    let waiting_ts = chat.post_message(&event.channel_id, Some(thread_ts), DEFAULT_LOADING_TEXT, Vec::new()).await?;

    let (text, blocks) = match agent.get_response(&event.user_id, &prompt, &history, &config.system_directive, false, false).await {
        Ok(response) => {
            info!(provider = %response.provider, "Answered app mention.");
            (format::truncate_fallback(&response.response), answer_blocks(config, &response, ResponseKind::General))
        }
        Err(e) => {
            error!("Failed to answer app mention: {e}");
            (error_fallback(&e.to_string()), format::format_error_message(&e.to_string()))
        }
    };

    chat.update_message(&event.channel_id, &waiting_ts, &text, blocks).await
}
