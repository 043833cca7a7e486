pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::base::types::{Res, Void};

// Types.

/// A message read back from a channel or thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Platform timestamp; unique within a channel.
    pub ts: String,
    /// Author's user ID (or bot ID for bot messages).
    pub user: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(ts: impl Into<String>, user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            user: user.into(),
            text: text.into(),
        }
    }
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// Blocks are passed as Block Kit JSON so the interaction layer can build them
/// without depending on any particular client library.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Used to strip the bot's own mention from prompts and to ignore the bot's messages.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// This sets up event listeners for the chat platform and begins processing
    /// commands, mentions, and direct messages.
    async fn start(&self) -> Void;

    /// Post a message, optionally in a thread, and return its timestamp.
    async fn post_message(&self, channel_id: &str, thread_ts: Option<&str>, text: &str, blocks: Vec<Value>) -> Res<String>;

    /// Replace the text and blocks of a previously posted message.
    async fn update_message(&self, channel_id: &str, ts: &str, text: &str, blocks: Vec<Value>) -> Void;

    /// Post a message only `user_id` can see.
    async fn post_ephemeral(&self, channel_id: &str, user_id: &str, text: &str, blocks: Vec<Value>) -> Void;

    /// Read up to `limit` recent messages, oldest first.
    ///
    /// With a `thread_ts` the thread's replies are read; otherwise the channel's history.
    async fn get_conversation(&self, channel_id: &str, thread_ts: Option<&str>, limit: u16) -> Res<Vec<ChatMessage>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
