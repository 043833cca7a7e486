#![cfg(test)]

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mockall::{Sequence, mock};
use oncall_bot::{
    base::{
        config::{Config, ConfigInner},
        types::{Res, Void},
    },
    interaction::{
        ChatEvent, CommandEvent, MENTION_WITHOUT_TEXT, RAG_LOADING_TEXT, command::respond_to_command, direct_message::respond_to_direct_message,
        mention::respond_to_mention,
    },
    service::{
        agent::AgentClient,
        chat::{ChatClient, ChatMessage, GenericChatClient},
        db::{DbClient, surreal::open_surreal_memory},
        llm::{CompletionRequest, CompletionResponse, ContentBlock, GenericLlmClient, LlmClient, LlmError, ModelInfo, TokenUsage, anthropic, openai},
        mcp::{McpClient, ToolDescriptor, ToolOutcome, ToolRegistry, ToolSession},
        rag::{
            RagClient,
            embedding::{EmbeddingClient, GenericEmbeddingClient},
            index::VectorIndex,
        },
    },
};
use serde_json::{Map, Value, json};

// Mocks.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn start(&self) -> Void;
        async fn post_message<'a, 'b, 'c, 'd>(&'a self, channel_id: &'b str, thread_ts: Option<&'c str>, text: &'d str, blocks: Vec<Value>) -> Res<String>;
        async fn update_message(&self, channel_id: &str, ts: &str, text: &str, blocks: Vec<Value>) -> Void;
        async fn post_ephemeral(&self, channel_id: &str, user_id: &str, text: &str, blocks: Vec<Value>) -> Void;
        async fn get_conversation<'a, 'b, 'c>(&'a self, channel_id: &'b str, thread_ts: Option<&'c str>, limit: u16) -> Res<Vec<ChatMessage>>;
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl GenericLlmClient for Llm {
        fn provider(&self) -> &'static str;
        fn models(&self) -> &'static [ModelInfo];
        fn supports_retrieval(&self) -> bool;
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
    }
}

/// Deterministic bag-of-words embedder with a constant bias dimension.
struct WordEmbedder;

#[async_trait]
impl GenericEmbeddingClient for WordEmbedder {
    fn is_configured(&self) -> bool {
        true
    }

    async fn embed(&self, texts: &[String]) -> Res<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; 129];

                for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    let mut hasher = DefaultHasher::new();
                    word.to_lowercase().hash(&mut hasher);
                    vector[(hasher.finish() as usize) % 128] += 1.0;
                }

                vector[128] = 1.0;
                vector
            })
            .collect())
    }
}

/// A code search server that always finds the same file.
struct CodeSearch;

#[async_trait]
impl ToolSession for CodeSearch {
    async fn invoke(&self, _name: &str, _arguments: Option<Map<String, Value>>) -> Res<ToolOutcome> {
        Ok(ToolOutcome::Success("src/auth/session.rs".to_string()))
    }
}

/// Messages the bot wrote, in order.
#[derive(Clone, Default)]
struct Outbox {
    sent: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl Outbox {
    fn push(&self, text: &str, blocks: Vec<Value>) {
        self.sent.lock().unwrap().push((text.to_string(), blocks));
    }

    fn last(&self) -> (String, Vec<Value>) {
        self.sent.lock().unwrap().last().cloned().expect("nothing was sent")
    }

    fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

// Helpers.

fn config() -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            docs_repo_owner: Some("acme".to_string()),
            docs_repo_name: Some("runbooks".to_string()),
            ..Default::default()
        }),
    }
}

fn mock_llm(name: &'static str, models: &'static [ModelInfo], retrieval: bool) -> MockLlm {
    let mut llm = MockLlm::new();
    llm.expect_provider().return_const(name);
    llm.expect_models().return_const(models);
    llm.expect_supports_retrieval().return_const(retrieval);
    llm
}

fn kafka_docs() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kafka_backlog.md"), "## Kafka Backlog\nBacklog normal range is 500-2500.").unwrap();
    std::fs::write(dir.path().join("akka_nodes.md"), "## Akka Nodes\n0 req/s indicates a node is down.").unwrap();
    dir
}

async fn agent(config: &Config, providers: Vec<LlmClient>, mcp: McpClient) -> (AgentClient, tempfile::TempDir) {
    let docs = kafka_docs();
    let db = open_surreal_memory().await.unwrap();

    let rag = RagClient::new(VectorIndex::new(db.clone(), "knowledge_docs", EmbeddingClient::new(Arc::new(WordEmbedder))));
    rag.initialize(docs.path()).await;

    (AgentClient::new(config.clone(), DbClient::surreal(db), rag, mcp, providers), docs)
}

fn no_tools() -> McpClient {
    McpClient::from_registry(ToolRegistry::default())
}

fn code_tools() -> McpClient {
    let mut registry = ToolRegistry::default();

    registry.register(
        "github",
        Arc::new(CodeSearch),
        vec![ToolDescriptor {
            name: "search_code".to_string(),
            description: "Search the repository.".to_string(),
            input_schema: json!({ "type": "object", "properties": { "query": { "type": "string" } } }),
        }],
    );

    McpClient::from_registry(registry)
}

fn seed_text(request: &CompletionRequest) -> String {
    match request.messages.first().and_then(|turn| turn.content.first()) {
        Some(ContentBlock::Text { text }) => text.clone(),
        _ => String::new(),
    }
}

fn block_texts(blocks: &[Value]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| {
            block["text"]["text"]
                .as_str()
                .or_else(|| block["elements"][0]["text"].as_str())
                .or_else(|| block["elements"][0]["elements"][0]["text"].as_str())
                .map(str::to_string)
        })
        .collect()
}

fn command(name: &str, text: &str) -> CommandEvent {
    CommandEvent {
        command: name.to_string(),
        channel_id: "C01ONCALL".to_string(),
        user_id: "U54321".to_string(),
        text: text.to_string(),
    }
}

/// A chat that records every posted and updated message.
fn recording_chat(outbox: &Outbox) -> MockChat {
    let mut chat = MockChat::new();

    chat.expect_bot_user_id().return_const("B0T".to_string());

    let posted = outbox.clone();
    chat.expect_post_message().returning(move |_, _, text, blocks| {
        posted.push(text, blocks);
        Ok("1700000000.000100".to_string())
    });

    let updated = outbox.clone();
    chat.expect_update_message().returning(move |_, _, text, blocks| {
        updated.push(text, blocks);
        Ok(())
    });

    chat
}

// Tests.

#[tokio::test]
async fn test_incident_command_cites_the_knowledge_base() {
    let config = config();

    let mut llm = mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true);
    llm.expect_complete()
        .times(1)
        .withf(|request| request.system.contains("500-2500") && request.system.contains("## Instructions") && request.tools.is_empty())
        .returning(|_| Ok(CompletionResponse::from_text("*Issue Summary*: the backlog is above its normal 500-2500 range.")));

    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(llm))], no_tools()).await;

    let outbox = Outbox::default();
    let chat = ChatClient::new(Arc::new(recording_chat(&outbox)));

    respond_to_command(&command("/incident", "kafka backlog is growing"), &config, &agent, &chat).await.unwrap();

    assert_eq!(outbox.len(), 2);

    let (loading, loading_blocks) = outbox.sent.lock().unwrap()[0].clone();
    assert_eq!(loading, format!("Q: kafka backlog is growing\n{RAG_LOADING_TEXT}"));
    assert_eq!(loading_blocks[0]["type"], "rich_text");

    let (text, blocks) = outbox.last();
    let texts = block_texts(&blocks);

    assert!(text.starts_with("Q: kafka backlog is growing\nA: *Issue Summary*"));
    assert_eq!(texts[0], "kafka backlog is growing");
    assert_eq!(texts[1], ":books: Knowledge Base Resolution");
    assert!(
        texts
            .last()
            .is_some_and(|t| t.contains("• <https://github.com/acme/runbooks/blob/main/data/docs/kafka_backlog.md|kafka backlog>"))
    );
}

#[tokio::test]
async fn test_ask_command_without_prompt_hints_privately() {
    let config = config();
    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true)))], no_tools()).await;

    let mut chat = MockChat::new();
    chat.expect_post_ephemeral()
        .times(1)
        .withf(|channel, user, text, blocks| channel == "C01ONCALL" && user == "U54321" && text == "Looks like you didn't provide a prompt. Try again." && blocks.is_empty())
        .returning(|_, _, _, _| Ok(()));

    respond_to_command(&command("/ask-bolty", "   "), &config, &agent, &ChatClient::new(Arc::new(chat))).await.unwrap();
}

#[tokio::test]
async fn test_code_command_runs_tools() {
    let config = config();

    let mut llm = mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true);
    let mut seq = Sequence::new();

    llm.expect_complete()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|request| request.tools.iter().any(|tool| tool.name == "search_code") && !request.system.contains("Retrieved Knowledge Base"))
        .returning(|_| {
            Ok(CompletionResponse {
                content: vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "search_code".to_string(),
                    input: json!({ "query": "session" }),
                }],
                usage: TokenUsage::default(),
            })
        });
    llm.expect_complete()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(CompletionResponse::from_text("Sessions are handled in `src/auth/session.rs`.")));

    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(llm))], code_tools()).await;

    let outbox = Outbox::default();
    let chat = ChatClient::new(Arc::new(recording_chat(&outbox)));

    respond_to_command(&command("/code", "where are sessions handled?"), &config, &agent, &chat).await.unwrap();

    let (_, blocks) = outbox.last();
    let texts = block_texts(&blocks);

    assert_eq!(texts[1], ":computer: Code Analysis");
    assert_eq!(texts[2], "Sessions are handled in `src/auth/session.rs`.");
}

#[tokio::test]
async fn test_backend_error_renders_error_block() {
    let config = config();

    let mut llm = mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true);
    llm.expect_complete().returning(|_| {
        Err(LlmError::Authentication {
            provider: "anthropic".to_string(),
            message: "invalid x-api-key".to_string(),
        })
    });

    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(llm))], no_tools()).await;

    let outbox = Outbox::default();
    let chat = ChatClient::new(Arc::new(recording_chat(&outbox)));

    respond_to_command(&command("/incident", "kafka backlog"), &config, &agent, &chat).await.unwrap();

    let (text, blocks) = outbox.last();

    assert!(text.starts_with("Something went wrong!\nauthentication with anthropic failed"));
    assert_eq!(block_texts(&blocks)[0], ":warning: Oops! Something went wrong");
}

#[tokio::test]
async fn test_mention_in_thread_uses_the_thread_as_context() {
    let config = config();

    let mut llm = mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true);
    llm.expect_complete()
        .times(1)
        .withf(|request| {
            seed_text(request) == "Prompt: is that bad?\nContext: U1: kafka backlog is at 9000\nU2: it keeps growing" && !request.system.contains("Retrieved Knowledge Base")
        })
        .returning(|_| Ok(CompletionResponse::from_text("Yes, 9000 is well above the normal range.")));

    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(llm))], no_tools()).await;

    let outbox = Outbox::default();
    let mut chat = recording_chat(&outbox);

    chat.expect_get_conversation()
        .times(1)
        .withf(|channel, thread_ts, limit| channel == "C01ONCALL" && *thread_ts == Some("100.0") && *limit == 10)
        .returning(|_, _, _| {
            Ok(vec![
                ChatMessage::new("100.0", "U1", "kafka backlog is at 9000"),
                ChatMessage::new("101.0", "U2", "it keeps growing"),
                ChatMessage::new("102.0", "U54321", "<@B0T> is that bad?"),
            ])
        });

    let event = ChatEvent {
        channel_id: "C01ONCALL".to_string(),
        user_id: "U54321".to_string(),
        ts: "102.0".to_string(),
        thread_ts: Some("100.0".to_string()),
        text: "<@B0T> is that bad?".to_string(),
    };

    respond_to_mention(&event, &config, &agent, &ChatClient::new(Arc::new(chat))).await.unwrap();

    let (text, blocks) = outbox.last();

    assert_eq!(text, "Yes, 9000 is well above the normal range.");
    assert_eq!(block_texts(&blocks)[0], ":robot_face: Bolty's Response");
}

#[tokio::test]
async fn test_bare_mention_asks_for_a_question() {
    let config = config();
    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true)))], no_tools()).await;

    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("B0T".to_string());
    chat.expect_post_message()
        .times(1)
        .withf(|_, thread_ts, text, _| *thread_ts == Some("200.0") && text == MENTION_WITHOUT_TEXT)
        .returning(|_, _, _, _| Ok("200.1".to_string()));

    let event = ChatEvent {
        channel_id: "C01ONCALL".to_string(),
        user_id: "U54321".to_string(),
        ts: "200.0".to_string(),
        thread_ts: None,
        text: "<@B0T>".to_string(),
    };

    respond_to_mention(&event, &config, &agent, &ChatClient::new(Arc::new(chat))).await.unwrap();
}

#[tokio::test]
async fn test_direct_message_follows_user_preference() {
    let config = Config {
        inner: Arc::new(ConfigInner {
            openai_api_key: "sk-test".to_string(),
            ..Default::default()
        }),
    };

    let mut claude = mock_llm(anthropic::PROVIDER_NAME, anthropic::MODELS, true);
    claude.expect_complete().never();

    let mut gpt = mock_llm(openai::PROVIDER_NAME, openai::MODELS, false);
    gpt.expect_complete()
        .times(1)
        .withf(|request| request.model == "gpt-4o-mini" && request.system == config_dm_directive())
        .returning(|_| Ok(CompletionResponse::from_text("Hello from GPT.")));

    let (agent, _docs) = agent(&config, vec![LlmClient::new(Arc::new(claude)), LlmClient::new(Arc::new(gpt))], no_tools()).await;

    agent.set_preference("U54321", openai::PROVIDER_NAME, "gpt-4o-mini").await.unwrap();

    let outbox = Outbox::default();
    let chat = ChatClient::new(Arc::new(recording_chat(&outbox)));

    let event = ChatEvent {
        channel_id: "D01DIRECT".to_string(),
        user_id: "U54321".to_string(),
        ts: "300.0".to_string(),
        thread_ts: None,
        text: "hello".to_string(),
    };

    respond_to_direct_message(&event, &config, &agent, &chat).await.unwrap();

    let (text, blocks) = outbox.last();

    assert_eq!(text, "Hello from GPT.");
    assert_eq!(block_texts(&blocks)[0], ":speech_balloon: Bolty's Response");
}

fn config_dm_directive() -> String {
    ConfigInner::default().dm_system_directive
}
