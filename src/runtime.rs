//! Runtime services and shared state for the oncall-bot.

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{
        agent::AgentClient,
        chat::ChatClient,
        db::{DbClient, surreal::open_surreal_kv},
        llm::LlmClient,
        mcp::McpClient,
        rag::RagClient,
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds every service client and the configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The preference store.
    pub db: DbClient,
    /// The knowledge base.
    pub rag: RagClient,
    /// The MCP tool gateway.
    pub mcp: McpClient,
    /// The response orchestrator.
    pub agent: AgentClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// The knowledge base is indexed before the chat client connects.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let surreal = open_surreal_kv(&config.db_path).await?;
        let db = DbClient::surreal(surreal.clone());

        // Initialize the knowledge base.
        let rag = RagClient::surreal(&config, surreal);
        rag.initialize(&config.docs_directory).await;

        // Initialize the tool gateway (connected lazily on first use).
        let mcp = McpClient::new(config.mcp_config_path.clone());

        // Initialize the providers and the orchestrator.
        let providers = vec![LlmClient::anthropic(&config), LlmClient::openai(&config)];
        let agent = AgentClient::new(config.clone(), db.clone(), rag.clone(), mcp.clone(), providers);

        info!("{} models available.", agent.available_models().len());

        // Initialize the slack client.
        let chat = ChatClient::slack(&config, agent.clone()).await?;

        Ok(Self { config, db, rag, mcp, agent, chat })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
