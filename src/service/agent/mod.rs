//! Response orchestration.
//!
//! [`AgentClient`] resolves the user's provider and model, optionally enriches
//! the system instructions with knowledge base context, optionally exposes the
//! MCP tools, and drives the [`agentic_loop`](agentic_loop::agentic_loop) to a
//! final answer.

pub mod agentic_loop;
pub mod prompt;

use std::{ops::Deref, sync::Arc};

use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ProviderResponse, RagSource, Res},
    },
    service::{
        db::{DbClient, UserPreference},
        llm::{CompletionRequest, LlmClient, LlmError, ModelInfo},
        mcp::McpClient,
        rag::{RagClient, RetrievedContext},
    },
};

// Types.

/// A single question put to a completion provider.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub prompt: &'a str,
    /// Prior messages rendered as `<user>: <text>` lines; may be empty.
    pub conversation_history: &'a str,
    pub system_content: &'a str,
    pub use_rag: bool,
    pub use_mcp: bool,
}

/// The answer to a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub response: String,
    pub rag_sources: Vec<RagSource>,
}

// Structs.

/// Orchestrates completion providers, retrieval, and tools.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct AgentClient {
    inner: Arc<AgentClientInner>,
}

impl Deref for AgentClient {
    type Target = AgentClientInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct AgentClientInner {
    config: Config,
    db: DbClient,
    rag: RagClient,
    mcp: McpClient,
    providers: Vec<LlmClient>,
}

impl AgentClient {
    pub fn new(config: Config, db: DbClient, rag: RagClient, mcp: McpClient, providers: Vec<LlmClient>) -> Self {
        Self {
            inner: Arc::new(AgentClientInner { config, db, rag, mcp, providers }),
        }
    }

    /// The registered provider with this name.
    pub fn provider(&self, name: &str) -> Option<&LlmClient> {
        self.providers.iter().find(|llm| llm.provider() == name)
    }

    /// Every configured `(provider, model)` pair.
    pub fn available_models(&self) -> Vec<(String, &'static ModelInfo)> {
        self.providers
            .iter()
            .flat_map(|llm| llm.models().iter().map(move |model| (llm.provider().to_string(), model)))
            .collect()
    }

    /// The user's stored preference, or the configured default.
    #[instrument(name = "AgentClient::resolve_preference", skip(self))]
    pub async fn resolve_preference(&self, user_id: &str) -> UserPreference {
        let default = UserPreference {
            provider: self.config.default_provider.clone(),
            model: self.config.default_model.clone(),
        };

        match self.db.get_user_preference(user_id).await {
            Ok(Some(preference)) => preference,
            Ok(None) => default,
            Err(e) => {
                warn!("Could not read the preference for `{user_id}`, using the default: {e}");
                default
            }
        }
    }

    /// Store the user's provider and model, if that provider offers the model.
    #[instrument(name = "AgentClient::set_preference", skip(self))]
    pub async fn set_preference(&self, user_id: &str, provider: &str, model: &str) -> Res<()> {
        let Some(llm) = self.provider(provider) else {
            return Err(LlmError::UnknownProvider { provider: provider.to_string() }.into());
        };

        if llm.max_tokens(model).is_none() {
            return Err(LlmError::UnknownModel {
                provider: provider.to_string(),
                model: model.to_string(),
            }
            .into());
        }

        let preference = UserPreference {
            provider: provider.to_string(),
            model: model.to_string(),
        };

        self.db.set_user_preference(user_id, &preference).await
    }

    /// Answer `prompt` with the user's selected provider and model.
    #[instrument(name = "AgentClient::get_response", skip(self, prompt, conversation_history, system_content))]
    pub async fn get_response(
        &self,
        user_id: &str,
        prompt: &str,
        conversation_history: &str,
        system_content: &str,
        use_rag: bool,
        use_mcp: bool,
    ) -> Result<ProviderResponse, LlmError> {
        let preference = self.resolve_preference(user_id).await;

        let Some(llm) = self.provider(&preference.provider) else {
            return Err(LlmError::UnknownProvider { provider: preference.provider });
        };

        let query = Query {
            prompt,
            conversation_history,
            system_content,
            use_rag,
            use_mcp,
        };

        let generated = self.generate(llm, &preference.model, query).await?;

        Ok(ProviderResponse {
            response: generated.response,
            rag_sources: generated.rag_sources,
            provider: llm.provider().to_string(),
        })
    }

    /// Assemble the prompt for `llm` and run the tool loop to a final answer.
    #[instrument(name = "AgentClient::generate", skip(self, llm, query), fields(provider = %llm.provider()))]
    pub async fn generate(&self, llm: &LlmClient, model: &str, query: Query<'_>) -> Result<Generated, LlmError> {
        let Some(max_tokens) = llm.max_tokens(model) else {
            return Err(LlmError::UnknownModel {
                provider: llm.provider().to_string(),
                model: model.to_string(),
            });
        };

        // Preparing.

        let tools = if query.use_mcp { self.mcp.connect().await.tools().to_vec() } else { Vec::new() };

        let context = if query.use_rag && llm.supports_retrieval() {
            self.rag.retrieve_context(query.prompt).await
        } else {
            RetrievedContext::none()
        };

        if query.use_rag && context.is_empty() {
            info!("No knowledge base context retrieved; answering from the original instructions.");
        }

        let system = prompt::enhance_system_content(query.system_content, &context);
        let seed = prompt::seed_turn(query.prompt, query.conversation_history);
        let request = CompletionRequest::new(model, system, seed, max_tokens).with_tools(tools);

        // Looping.

        let response = agentic_loop::agentic_loop(&**llm, &self.mcp, request).await?;

        Ok(Generated {
            response,
            rag_sources: context.sources().to_vec(),
        })
    }
}

// Tests.
