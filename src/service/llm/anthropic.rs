//! Anthropic Messages API client.
//!
//! This is the provider that offers knowledge base retrieval: the chat boundary
//! only renders citations when the answer came from here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};

use crate::{base::config::Config, service::mcp::ToolDescriptor};

use super::{CompletionRequest, CompletionResponse, ContentBlock, GenericLlmClient, LlmClient, LlmError, ModelInfo, TokenUsage, ToolChoice, Turn};

/// Name this provider is registered and stored under.
pub const PROVIDER_NAME: &str = "anthropic";

/// Models offered by this provider, with their fixed output budgets.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "claude-3-5-sonnet-20240620",
        name: "Claude 3.5 Sonnet",
        max_tokens: 4096,
    },
    ModelInfo {
        id: "claude-3-sonnet-20240229",
        name: "Claude 3 Sonnet",
        max_tokens: 4096,
    },
    ModelInfo {
        id: "claude-3-haiku-20240307",
        name: "Claude 3 Haiku",
        max_tokens: 4096,
    },
    ModelInfo {
        id: "claude-3-opus-20240229",
        name: "Claude 3 Opus",
        max_tokens: 4096,
    },
];

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

// Extra methods on `LlmClient` applied by the anthropic implementation.

impl LlmClient {
    pub fn anthropic(config: &Config) -> Self {
        let client = AnthropicLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Wire types.

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDescriptor],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

fn no_tools(tools: &&[ToolDescriptor]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Usage,
}

/// A block of assistant output.  Block types the bot does not act on (thinking, server tools) are dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

impl MessagesResponse {
    fn into_content(self) -> Vec<ContentBlock> {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
                ResponseBlock::Unknown => {
                    debug!("Dropping an unsupported response block.");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

// Specific implementations.

/// Anthropic LLM client implementation.
#[derive(Clone)]
pub struct AnthropicLlmClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl AnthropicLlmClient {
    /// Create a new Anthropic LLM client.
    #[instrument(name = "AnthropicLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.anthropic_api_key.clone(),
            api_url: API_URL.to_string(),
        }
    }

    /// Point the client at a different Messages endpoint (e.g., a proxy).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Build the JSON body for a completion request.
    fn build_body(request: &CompletionRequest) -> Result<Value, LlmError> {
        let tool_choice = match request.tool_choice {
            ToolChoice::None if !request.tools.is_empty() => Some(json!({ "type": "none" })),
            ToolChoice::None | ToolChoice::Auto => None,
        };

        let body = MessagesRequest {
            model: &request.model,
            system: &request.system,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            tools: &request.tools,
            tool_choice,
        };

        serde_json::to_value(&body).map_err(|e| LlmError::InvalidRequest {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl GenericLlmClient for AnthropicLlmClient {
    fn provider(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn models(&self) -> &'static [ModelInfo] {
        if self.api_key.is_empty() { &[] } else { MODELS }
    }

    fn supports_retrieval(&self) -> bool {
        true
    }

    #[instrument(name = "AnthropicLlmClient::complete", skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = Self::build_body(request)?;

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Server could not be reached: {e}");
                LlmError::Connection {
                    provider: PROVIDER_NAME.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(ErrorResponse { error }) => format!("{}: {}", error.kind, error.message),
                Err(_) => text,
            };

            error!("Anthropic returned status {}: {message}", status.as_u16());

            return Err(LlmError::from_status(PROVIDER_NAME, status.as_u16(), message));
        }

        let response: MessagesResponse = response.json().await.map_err(|e| LlmError::Decode {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
        })?;

        info!(input_tokens = response.usage.input_tokens, output_tokens = response.usage.output_tokens, "Anthropic completion finished.");

        let usage = TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };

        Ok(CompletionResponse {
            content: response.into_content(),
            usage,
        })
    }
}

// Tests.
