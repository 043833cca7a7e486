//! Slack integration for the oncall-bot.
//!
//! This module connects to Slack in socket mode and provides:
//! - Slash command handling (`/ask-bolty`, `/incident`, `/code`).
//! - App mention and direct message handling.
//! - Posting, updating, and ephemeral messages with Block Kit blocks.
//! - Reading channel history and thread replies for conversation context.

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::{self, ChatEvent, CommandEvent},
    service::agent::AgentClient,
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value;
use slack_morphism::{errors::SlackClientError, prelude::*};
use tracing::{debug, info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, ChatMessage, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

/// Channel type Slack reports for direct messages.
const DIRECT_MESSAGE_CHANNEL_TYPE: &str = "im";

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, agent: AgentClient) -> Res<Self> {
        let client = SlackChatClient::new(config, agent).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    config: Config,
    agent: AgentClient,
    chat: ChatClient,
    bot_user_id: String,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub config: Config,
    pub agent: AgentClient,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, agent: AgentClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            config: config.clone(),
            agent,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            config: self.config.clone(),
            agent: self.agent.clone(),
            chat: ChatClient::from(self.clone()),
            bot_user_id: self.bot_user_id.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register the app token, then serve until Ctrl-C.

        socket_mode_listener.listen_for(&self.app_token).await?;
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text, blocks))]
    async fn post_message(&self, channel_id: &str, thread_ts: Option<&str>, text: &str, blocks: Vec<Value>) -> Res<String> {
        let content = message_content(text, blocks)?;

        let mut request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), content).with_link_names(true);

        if let Some(thread_ts) = thread_ts {
            request = request.with_thread_ts(SlackTs(thread_ts.to_string()));
        }

        let session = self.client.open_session(&self.bot_token);

        let response = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to post message: {}", e))?;

        Ok(response.ts.0)
    }

    #[instrument(skip(self, text, blocks))]
    async fn update_message(&self, channel_id: &str, ts: &str, text: &str, blocks: Vec<Value>) -> Void {
        let content = message_content(text, blocks)?;

        let request = SlackApiChatUpdateRequest::new(SlackChannelId(channel_id.to_string()), content, SlackTs(ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_update(&request).await.map_err(|e| anyhow::anyhow!("Failed to update message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, text, blocks))]
    async fn post_ephemeral(&self, channel_id: &str, user_id: &str, text: &str, blocks: Vec<Value>) -> Void {
        let content = message_content(text, blocks)?;

        let request = SlackApiChatPostEphemeralRequest::new(SlackChannelId(channel_id.to_string()), SlackUserId(user_id.to_string()), content);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_ephemeral(&request).await.map_err(|e| anyhow::anyhow!("Failed to post ephemeral message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_conversation(&self, channel_id: &str, thread_ts: Option<&str>, limit: u16) -> Res<Vec<ChatMessage>> {
        let session = self.client.open_session(&self.bot_token);
        let channel = SlackChannelId(channel_id.to_string());

        let messages = match thread_ts {
            Some(thread_ts) => {
                let request = SlackApiConversationsRepliesRequest::new(channel, SlackTs(thread_ts.to_string())).with_limit(limit);

                match session.conversations_replies(&request).await {
                    Ok(response) => response.messages,
                    // A top-level message has no thread yet.
                    Err(SlackClientError::ApiError(ae)) if ae.code == "thread_not_found" => Vec::new(),
                    Err(e) => return Err(e.into()),
                }
            }
            None => {
                let request = SlackApiConversationsHistoryRequest::new().with_channel(channel).with_limit(limit);

                // History is newest first.
                let mut messages = session.conversations_history(&request).await?.messages;
                messages.reverse();
                messages
            }
        };

        Ok(messages.iter().map(to_chat_message).collect())
    }
}

// Socket mode listener callbacks for Slack.

/// Handles slash commands from Slack.
///
/// The command is acknowledged immediately with an empty response; the answer is posted asynchronously.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    info!("Received command `{}` ...", event.command.0);

    let command = CommandEvent {
        command: event.command.0,
        channel_id: event.channel_id.0,
        user_id: event.user_id.0,
        text: event.text.unwrap_or_default(),
    };

    interaction::command::handle_command(command, user_state.config.clone(), user_state.agent.clone(), user_state.chat.clone());

    Ok(SlackCommandEventResponse::new(SlackMessageContent::new()))
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            let is_direct_message = slack_message_event.origin.channel_type.as_ref().is_some_and(|t| t.0 == DIRECT_MESSAGE_CHANNEL_TYPE);

            if !is_direct_message {
                debug!("Skipping message event outside a direct message.");
                return Ok(());
            }

            // Edits, deletions, and our own replies arrive as message events too.
            if slack_message_event.subtype.is_some() || slack_message_event.sender.bot_id.is_some() {
                debug!("Skipping message event with a subtype or from a bot.");
                return Ok(());
            }

            let Some(user) = slack_message_event.sender.user.as_ref() else {
                warn!("Skipping message event without a user.");
                return Ok(());
            };

            if user.0 == user_state.bot_user_id {
                return Ok(());
            }

            info!("Received direct message event ...");

            let channel_id = slack_message_event.origin.channel.as_ref().ok_or(anyhow::anyhow!("Failed to get channel ID"))?.0.to_owned();

            let event = ChatEvent {
                channel_id,
                user_id: user.0.clone(),
                ts: slack_message_event.origin.ts.0.clone(),
                thread_ts: slack_message_event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
                text: slack_message_event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default(),
            };

            interaction::direct_message::handle_direct_message(event, user_state.config.clone(), user_state.agent.clone(), user_state.chat.clone());
        }
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");

            let event = ChatEvent {
                channel_id: slack_app_mention_event.channel.0,
                user_id: slack_app_mention_event.user.0,
                ts: slack_app_mention_event.origin.ts.0,
                thread_ts: slack_app_mention_event.origin.thread_ts.map(|ts| ts.0),
                text: slack_app_mention_event.content.text.unwrap_or_default(),
            };

            interaction::mention::handle_app_mention(event, user_state.config.clone(), user_state.agent.clone(), user_state.chat.clone());
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Helpers.

/// Message content with fallback text and Block Kit blocks.
fn message_content(text: &str, blocks: Vec<Value>) -> Res<SlackMessageContent> {
    let content = SlackMessageContent::new().with_text(text.to_string());

    if blocks.is_empty() {
        return Ok(content);
    }

    let blocks: Vec<SlackBlock> = serde_json::from_value(Value::Array(blocks))?;

    Ok(content.with_blocks(blocks))
}

/// Flatten a Slack history message into the author and text the interaction layer needs.
fn to_chat_message(message: &SlackHistoryMessage) -> ChatMessage {
    let user = message
        .sender
        .user
        .as_ref()
        .map(|user| user.0.clone())
        .or_else(|| message.sender.bot_id.as_ref().map(|bot| bot.0.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    ChatMessage::new(message.origin.ts.0.clone(), user, message.content.text.clone().unwrap_or_default())
}

// Tests.
