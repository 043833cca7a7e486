//! OpenAI chat completions client.
//!
//! Converts the provider-agnostic turns into chat completion messages: tool
//! uses become assistant `tool_calls`, and tool results become `tool` messages.

use std::sync::Arc;

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs, FunctionCall,
        FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::base::config::Config;

use super::{CompletionRequest, CompletionResponse, ContentBlock, GenericLlmClient, LlmClient, LlmError, ModelInfo, Role, TokenUsage, ToolChoice, Turn};

/// Name this provider is registered and stored under.
pub const PROVIDER_NAME: &str = "openai";

/// Models offered by this provider, with their fixed output budgets.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4o",
        name: "GPT-4o",
        max_tokens: 4096,
    },
    ModelInfo {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        max_tokens: 4096,
    },
    ModelInfo {
        id: "gpt-4-turbo",
        name: "GPT-4 Turbo",
        max_tokens: 4096,
    },
];

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    configured: bool,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            configured: !config.openai_api_key.is_empty(),
        }
    }

    /// Build the chat completion request.
    fn build_request(request: &CompletionRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestSystemMessageArgs::default().content(request.system.clone()).build()?.into()];

        for turn in &request.messages {
            messages.extend(convert_turn(turn)?);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model).messages(messages).max_completion_tokens(request.max_tokens);

        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|tool| {
                    ChatCompletionToolArgs::default()
                        .r#type(ChatCompletionToolType::Function)
                        .function(
                            FunctionObjectArgs::default()
                                .name(tool.name.clone())
                                .description(tool.description.clone())
                                .parameters(tool.input_schema.clone())
                                .build()?,
                        )
                        .build()
                })
                .collect::<Result<Vec<ChatCompletionTool>, OpenAIError>>()?;

            args.tools(tools);

            if request.tool_choice == ToolChoice::None {
                args.tool_choice(ChatCompletionToolChoiceOption::None);
            }
        }

        args.build()
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    fn provider(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn models(&self) -> &'static [ModelInfo] {
        if self.configured { MODELS } else { &[] }
    }

    #[instrument(name = "OpenAiLlmClient::complete", skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let openai_request = Self::build_request(request).map_err(map_openai_error)?;

        let response = self.client.chat().create(openai_request).await.map_err(|e| {
            error!("OpenAI completion failed: {e}");
            map_openai_error(e)
        })?;

        let usage = response.usage.as_ref().map_or_else(TokenUsage::default, |u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        info!(input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "OpenAI completion finished.");

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::Decode {
                provider: PROVIDER_NAME.to_string(),
                message: "response contained no choices".to_string(),
            });
        };

        let mut content = Vec::new();

        if let Some(text) = choice.message.content {
            content.push(ContentBlock::Text { text });
        }

        for call in choice.message.tool_calls.unwrap_or_default() {
            let input = serde_json::from_str::<Value>(&call.function.arguments).unwrap_or_else(|e| {
                warn!("Tool call `{}` had malformed arguments: {e}", call.function.name);
                Value::Object(Default::default())
            });

            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        Ok(CompletionResponse { content, usage })
    }
}

// Helpers.

/// Convert one provider-agnostic turn into chat completion messages.
fn convert_turn(turn: &Turn) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_messages = Vec::new();

    for block in &turn.content {
        match block {
            ContentBlock::Text { text } => texts.push(text.as_str()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatCompletionMessageToolCall {
                id: id.clone(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                tool_messages.push(ChatCompletionRequestToolMessageArgs::default().content(content.clone()).tool_call_id(tool_use_id.clone()).build()?.into());
            }
        }
    }

    let text = texts.join("\n\n");
    let mut messages: Vec<ChatCompletionRequestMessage> = tool_messages;

    match turn.role {
        Role::User => {
            if !text.is_empty() {
                messages.push(ChatCompletionRequestUserMessageArgs::default().content(text).build()?.into());
            }
        }
        Role::Assistant => {
            let mut assistant = ChatCompletionRequestAssistantMessageArgs::default();

            if !text.is_empty() {
                assistant.content(text);
            }

            if !tool_calls.is_empty() {
                assistant.tool_calls(tool_calls);
            }

            messages.push(assistant.build()?.into());
        }
    }

    Ok(messages)
}

/// Map an `async-openai` error onto the named failure categories.
fn map_openai_error(err: OpenAIError) -> LlmError {
    let provider = PROVIDER_NAME.to_string();

    match err {
        OpenAIError::Reqwest(e) => LlmError::Connection { provider, message: e.to_string() },
        OpenAIError::ApiError(api) => match api.code.as_deref() {
            Some("invalid_api_key") | Some("invalid_organization") => LlmError::Authentication { provider, message: api.message },
            Some("rate_limit_exceeded") | Some("insufficient_quota") => LlmError::RateLimited { provider, message: api.message },
            _ if api.r#type.as_deref() == Some("invalid_request_error") => LlmError::InvalidRequest { provider, message: api.message },
            _ => LlmError::Api {
                provider,
                status: 0,
                message: api.message,
            },
        },
        OpenAIError::JSONDeserialize(e) => LlmError::Decode { provider, message: e.to_string() },
        OpenAIError::InvalidArgument(message) => LlmError::InvalidRequest { provider, message },
        other => LlmError::Api {
            provider,
            status: 0,
            message: other.to_string(),
        },
    }
}

// Tests.
