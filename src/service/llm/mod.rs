//! Integration with Large Language Model completion backends.
//!
//! This module defines a provider-agnostic conversation model (role-tagged turns
//! made of [`ContentBlock`]s), the [`GenericLlmClient`] trait that each provider
//! implements, and the [`LlmError`] taxonomy that completion failures surface as.

pub mod anthropic;
pub mod openai;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::mcp::ToolDescriptor;

// Types.

/// A single block of turn content.
///
/// The wire format mirrors the Anthropic Messages API, so these serialize as-is for that provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// A tool invocation requested by the model.
    ToolUse { id: String, name: String, input: Value },
    /// The outcome of a tool invocation, correlated by `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// The speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A role-tagged conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    /// A user turn holding a single text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// An assistant turn holding the model's raw content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content }
    }

    /// A user turn carrying tool results.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content: results }
    }
}

/// A tool invocation extracted from a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Whether the model may call the tools it is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Tools stay declared (earlier turns reference them) but must not be called.
    None,
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    /// Tools the model may call; empty means no tool access.
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    /// A request seeded with a single user turn.
    pub fn new(model: impl Into<String>, system: impl Into<String>, seed: Turn, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: vec![seed],
            max_tokens,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token accounting for a completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A model's reply to a [`CompletionRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// A response made of a single text block.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            usage: TokenUsage::default(),
        }
    }

    /// All tool invocations in the response, in order.
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                ContentBlock::Text { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect()
    }

    /// The textual answer, if any text blocks are present.
    pub fn text(&self) -> Option<String> {
        let parts = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect::<Vec<_>>();

        let text = parts.join("\n\n");

        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// A model a provider offers, with its fixed output budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub max_tokens: u32,
}

// Errors.

/// Named completion-backend failure categories.
///
/// These are the only errors the response pipeline propagates to its caller;
/// retrieval and tool failures are absorbed as degraded functionality.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("authentication with {provider} failed: {message}")]
    Authentication { provider: String, message: String },
    #[error("{provider} rate limit reached: {message}")]
    RateLimited { provider: String, message: String },
    #[error("could not reach {provider}: {message}")]
    Connection { provider: String, message: String },
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: String, message: String },
    #[error("{provider} returned status {status}: {message}")]
    Api { provider: String, status: u16, message: String },
    #[error("could not decode the {provider} response: {message}")]
    Decode { provider: String, message: String },
    #[error("model `{model}` is not offered by {provider}")]
    UnknownModel { provider: String, model: String },
    #[error("provider `{provider}` is not available")]
    UnknownProvider { provider: String },
}

impl LlmError {
    /// Classify a non-success HTTP status from a completion backend.
    pub fn from_status(provider: &str, status: u16, message: String) -> Self {
        let provider = provider.to_string();

        match status {
            401 | 403 => Self::Authentication { provider, message },
            429 => Self::RateLimited { provider, message },
            400 | 404 | 413 | 422 => Self::InvalidRequest { provider, message },
            _ => Self::Api { provider, status, message },
        }
    }
}

// Traits.

/// Generic LLM client trait that completion providers must implement.
///
/// Implementing this trait allows different LLM providers to drive the same
/// response pipeline, including the agentic tool loop.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// The provider's name (e.g., `anthropic`).
    fn provider(&self) -> &'static str;

    /// The models this provider offers; empty when the provider is not configured.
    fn models(&self) -> &'static [ModelInfo];

    /// Whether answers from this provider are augmented with knowledge base context.
    fn supports_retrieval(&self) -> bool {
        false
    }

    /// Issue a single completion request.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }

    /// The fixed output budget for `model`, if this provider offers it.
    pub fn max_tokens(&self, model: &str) -> Option<u32> {
        self.models().iter().find(|info| info.id == model).map(|info| info.max_tokens)
    }
}

// Helpers.

/// Look up a model in the fixed per-provider tables, regardless of configured credentials.
pub fn find_model(provider: &str, model: &str) -> Option<&'static ModelInfo> {
    let table = match provider {
        anthropic::PROVIDER_NAME => anthropic::MODELS,
        openai::PROVIDER_NAME => openai::MODELS,
        _ => return None,
    };

    table.iter().find(|info| info.id == model)
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_content_block_wire_format() {
        let blocks = vec![
            ContentBlock::text("hi"),
            ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "search_code".to_string(),
                input: json!({ "q": "auth" }),
            },
            ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: "Error: Tool search_code not available".to_string(),
                is_error: true,
            },
            ContentBlock::ToolResult {
                tool_use_id: "toolu_2".to_string(),
                content: "ok".to_string(),
                is_error: false,
            },
        ];

        assert_eq!(
            serde_json::to_value(&blocks).unwrap(),
            json!([
                { "type": "text", "text": "hi" },
                { "type": "tool_use", "id": "toolu_1", "name": "search_code", "input": { "q": "auth" } },
                { "type": "tool_result", "tool_use_id": "toolu_1", "content": "Error: Tool search_code not available", "is_error": true },
                { "type": "tool_result", "tool_use_id": "toolu_2", "content": "ok" },
            ])
        );
    }

    #[test]
    fn test_response_text_and_tool_uses() {
        let response = CompletionResponse {
            content: vec![
                ContentBlock::text("Let me look."),
                ContentBlock::ToolUse {
                    id: "a".to_string(),
                    name: "search_code".to_string(),
                    input: json!({}),
                },
            ],
            usage: TokenUsage::default(),
        };

        assert_eq!(response.text().as_deref(), Some("Let me look."));
        assert_eq!(response.tool_uses().len(), 1);
        assert_eq!(response.tool_uses()[0].name, "search_code");
    }

    #[test]
    fn test_blank_text_is_no_text() {
        assert!(CompletionResponse::from_text("  \n").text().is_none());
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(LlmError::from_status("anthropic", 401, String::new()), LlmError::Authentication { .. }));
        assert!(matches!(LlmError::from_status("anthropic", 429, String::new()), LlmError::RateLimited { .. }));
        assert!(matches!(LlmError::from_status("anthropic", 400, String::new()), LlmError::InvalidRequest { .. }));
        assert!(matches!(LlmError::from_status("anthropic", 529, String::new()), LlmError::Api { status: 529, .. }));
    }

    #[test]
    fn test_find_model() {
        assert_eq!(find_model("anthropic", "claude-3-haiku-20240307").map(|m| m.max_tokens), Some(4096));
        assert!(find_model("anthropic", "gpt-4o").is_none());
        assert!(find_model("nobody", "gpt-4o").is_none());
    }
}
