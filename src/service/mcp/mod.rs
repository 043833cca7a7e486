//! Tool gateway over the Model Context Protocol (MCP).
//!
//! Servers are read from a JSON file, connected once, and their tools are
//! flattened into a single [`ToolRegistry`] that routes each tool name to the
//! session that owns it.

use std::{collections::HashMap, ops::Deref, path::PathBuf, str::FromStr, sync::Arc};

use async_trait::async_trait;
use hyper::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use regex::Regex;
use rmcp::{
    RoleClient, ServiceExt,
    model::CallToolRequestParam,
    service::RunningService,
    transport::{StreamableHttpClientTransport, TokioChildProcess, streamable_http_client::StreamableHttpClientTransportConfig},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{process::Command, sync::OnceCell};
use tracing::{error, info, instrument, warn};

use crate::base::types::Res;

/// Tool results longer than this many characters are truncated.
pub const MAX_TOOL_RESULT_CHARS: usize = 4000;

// Types.

/// A named capability exposed by a tool server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Build a descriptor from an MCP tool listing entry (`name`, `description`, `inputSchema`).
    pub fn from_listing(listing: &Value) -> Option<Self> {
        let name = listing.get("name")?.as_str()?.to_string();
        let description = listing.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let input_schema = listing.get("inputSchema").cloned().unwrap_or_else(|| serde_json::json!({ "type": "object" }));

        Some(Self { name, description, input_schema })
    }
}

/// The outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool ran and returned this text.
    Success(String),
    /// The tool (or its session) reported a failure.
    Failed(String),
    /// No registered tool has this name.
    Unavailable,
}

impl ToolOutcome {
    /// Render the outcome as tool-result content, returning `(content, is_error)`.
    pub fn into_content(self, tool_name: &str) -> (String, bool) {
        match self {
            Self::Success(text) => (text, false),
            Self::Failed(message) => (format!("Error: {message}"), true),
            Self::Unavailable => (format!("Error: Tool {tool_name} not available"), true),
        }
    }
}

/// Struct that represents a server in the MCP configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub config: McpServerConfig,
}

/// Enum that represents the configuration of an MCP server, which can be either local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Local {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, alias = "envs")]
        env: Option<HashMap<String, String>>,
    },
    Remote {
        url: String,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
    },
}

// Traits.

/// A connected tool server session.
#[async_trait]
pub trait ToolSession: Send + Sync + 'static {
    /// Call the named tool on this session.
    async fn invoke(&self, name: &str, arguments: Option<Map<String, Value>>) -> Res<ToolOutcome>;
}

#[async_trait]
impl ToolSession for RunningService<RoleClient, ()> {
    async fn invoke(&self, name: &str, arguments: Option<Map<String, Value>>) -> Res<ToolOutcome> {
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };

        let result = self.call_tool(request).await?;
        let result = serde_json::to_value(&result)?;

        let text = extract_text(&result);
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);

        Ok(if is_error { ToolOutcome::Failed(text) } else { ToolOutcome::Success(text) })
    }
}

// Structs.

struct Route {
    server: String,
    session: Arc<dyn ToolSession>,
}

/// Flat registry of every discovered tool, keyed by tool name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    routes: HashMap<String, Arc<Route>>,
}

impl ToolRegistry {
    /// Register a server's tools.  A name already owned by another server is taken over by this one.
    pub fn register(&mut self, server: &str, session: Arc<dyn ToolSession>, tools: Vec<ToolDescriptor>) {
        let route = Arc::new(Route {
            server: server.to_string(),
            session,
        });

        for tool in tools {
            if let Some(previous) = self.routes.insert(tool.name.clone(), route.clone()) {
                warn!(tool = %tool.name, previous = %previous.server, server = %server, "Tool name collision; the later server shadows the earlier one.");
                self.tools.retain(|t| t.name != tool.name);
            }

            self.tools.push(tool);
        }
    }

    /// All registered tools.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The server that owns `name`, if any.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|route| route.server.as_str())
    }

    /// Invoke a tool by name, truncating oversized output.
    #[instrument(name = "ToolRegistry::invoke", skip(self, arguments))]
    pub async fn invoke(&self, name: &str, arguments: &Value) -> ToolOutcome {
        let Some(route) = self.routes.get(name) else {
            warn!("Tool `{name}` is not registered.");
            return ToolOutcome::Unavailable;
        };

        let arguments = match arguments {
            Value::Object(map) => Some(map.clone()),
            Value::Null => None,
            other => {
                warn!("Tool `{name}` received non-object arguments: {other}");
                None
            }
        };

        match route.session.invoke(name, arguments).await {
            Ok(ToolOutcome::Success(text)) => ToolOutcome::Success(truncate_tool_result(text)),
            Ok(ToolOutcome::Failed(text)) => ToolOutcome::Failed(truncate_tool_result(text)),
            Ok(ToolOutcome::Unavailable) => ToolOutcome::Unavailable,
            Err(e) => {
                error!("Tool `{name}` on server `{}` failed: {e}", route.server);
                ToolOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Struct for McpClient.
///
/// This is an opinionated concrete implementation of the tool gateway.  Servers are
/// connected lazily on first use, exactly once, and the registry is then shared read-only.
///
/// It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<McpClientInner>,
}

impl Deref for McpClient {
    type Target = McpClientInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Inner implementation of the MCP client.
pub struct McpClientInner {
    config_path: PathBuf,
    registry: OnceCell<ToolRegistry>,
}

impl McpClient {
    /// Creates a new MCP client that reads its servers from `config_path` when first connected.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(McpClientInner {
                config_path: config_path.into(),
                registry: OnceCell::new(),
            }),
        }
    }

    /// Creates an already-connected MCP client from a prepared registry.
    pub fn from_registry(registry: ToolRegistry) -> Self {
        Self {
            inner: Arc::new(McpClientInner {
                config_path: PathBuf::new(),
                registry: OnceCell::new_with(Some(registry)),
            }),
        }
    }

    /// Connect every configured server.  Subsequent calls reuse the first connection.
    #[instrument(name = "McpClient::connect", skip_all)]
    pub async fn connect(&self) -> &ToolRegistry {
        self.registry
            .get_or_init(|| async {
                let servers = get_servers_from_mcp_json(load_mcp_json(&self.config_path));
                connect_servers(servers).await
            })
            .await
    }

    /// The tools currently registered; empty until connected.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.get().map(|registry| registry.tools().to_vec()).unwrap_or_default()
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> ToolOutcome {
        match self.registry.get() {
            Some(registry) => registry.invoke(name, arguments).await,
            None => ToolOutcome::Unavailable,
        }
    }
}

// Helpers.

/// Load the MCP JSON configuration from the given path, merging the `servers` and `mcpServers` objects.
pub fn load_mcp_json(path: impl AsRef<std::path::Path>) -> Map<String, Value> {
    let path = path.as_ref();

    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            warn!("MCP configuration `{}` could not be read: {e}", path.display());
            return Map::new();
        }
    };

    let json = match serde_json::from_str::<Value>(&json) {
        Ok(json) => json,
        Err(e) => {
            error!("MCP configuration `{}` is not valid JSON: {e}", path.display());
            return Map::new();
        }
    };

    let mut json_servers = Map::new();

    for key in ["servers", "mcpServers"] {
        if let Some(Value::Object(servers)) = json.get(key) {
            json_servers.extend(servers.clone());
        }
    }

    json_servers
}

/// Parse the JSON servers into [`McpServer`]s, expanding `${VAR}` placeholders.  Bad entries are logged and skipped.
pub fn get_servers_from_mcp_json(json_servers: Map<String, Value>) -> Vec<McpServer> {
    json_servers
        .into_iter()
        .filter_map(|(name, value)| {
            let parsed = expand_env_vars(value).and_then(|value| Ok(serde_json::from_value::<McpServerConfig>(value)?));

            match parsed {
                Ok(config) => Some(McpServer { name, config }),
                Err(e) => {
                    error!("MCP server `{name}` has an invalid configuration: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Replace every `${NAME}` in the string values of `value` with the environment variable `NAME`.
///
/// Unset variables expand to the empty string, with a warning.
pub fn expand_env_vars(value: Value) -> Res<Value> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    Ok(expand_with(value, &pattern))
}

fn expand_with(value: Value, pattern: &Regex) -> Value {
    match value {
        Value::String(s) => {
            let expanded = pattern.replace_all(&s, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| {
                    warn!("Environment variable `{name}` is not set; substituting an empty string.");
                    String::new()
                })
            });

            Value::String(expanded.into_owned())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|item| expand_with(item, pattern)).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, expand_with(v, pattern))).collect()),
        other => other,
    }
}

/// Establish a session with the given [`McpServer`].
pub async fn get_mcp_server_client(server: &McpServer) -> Res<RunningService<RoleClient, ()>> {
    match &server.config {
        McpServerConfig::Local { command, args, env } => {
            let mut command = Command::new(command);

            command.args(args);

            if let Some(env) = env {
                command.envs(env);
            }

            let transport = TokioChildProcess::new(command)?;

            Ok(().serve(transport).await?)
        }
        McpServerConfig::Remote { url, headers } => {
            // Compute headers.
            let mut header_map = HeaderMap::new();
            if let Some(headers) = headers {
                for (key, value) in headers {
                    header_map.insert(HeaderName::from_str(key)?, HeaderValue::from_str(value)?);
                }
            }

            // Build client.
            let client = reqwest::Client::builder().default_headers(header_map).build()?;

            // Build config.
            let config = StreamableHttpClientTransportConfig::with_uri(url.as_str());

            // Build the transport.
            let transport = StreamableHttpClientTransport::with_client(client, config);

            Ok(().serve(transport).await?)
        }
    }
}

/// Connect to one server and list its tools.
async fn connect_server(server: &McpServer) -> Res<(Arc<dyn ToolSession>, Vec<ToolDescriptor>)> {
    let client = get_mcp_server_client(server).await?;
    let listings = client.list_all_tools().await?;

    let tools = listings
        .iter()
        .filter_map(|tool| serde_json::to_value(tool).ok())
        .filter_map(|listing| ToolDescriptor::from_listing(&listing))
        .collect::<Vec<_>>();

    Ok((Arc::new(client), tools))
}

/// Connect every server concurrently and aggregate their tools.  Failing servers are logged and skipped.
pub async fn connect_servers(servers: Vec<McpServer>) -> ToolRegistry {
    let tasks = servers.iter().map(|server| async move { (server, connect_server(server).await) });

    let mut registry = ToolRegistry::default();

    for (server, result) in futures::future::join_all(tasks).await {
        match result {
            Ok((session, tools)) => {
                info!("Connected to MCP server `{}` with {} tools.", server.name, tools.len());
                registry.register(&server.name, session, tools);
            }
            Err(e) => error!("Failed to connect to MCP server `{}`: {e}", server.name),
        }
    }

    info!("Tool registry holds {} tools.", registry.tools().len());

    registry
}

/// Truncate a tool result to [`MAX_TOOL_RESULT_CHARS`] characters, noting how many were cut.
pub fn truncate_tool_result(text: String) -> String {
    let total = text.chars().count();

    if total <= MAX_TOOL_RESULT_CHARS {
        return text;
    }

    let kept = text.chars().take(MAX_TOOL_RESULT_CHARS).collect::<String>();

    format!("{kept}\n\n[... truncated {} characters ...]", total - MAX_TOOL_RESULT_CHARS)
}

/// Join the text items of a serialized `CallToolResult`; other items are kept as JSON.
fn extract_text(result: &Value) -> String {
    let Some(items) = result.get("content").and_then(Value::as_array) else {
        return String::new();
    };

    items
        .iter()
        .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text").and_then(Value::as_str)) {
            (Some("text"), Some(text)) => text.to_string(),
            _ => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}


// Tests.

#[cfg(test)]
mod tests {
    use mockall::{mock, predicate::*};
    use serde_json::json;

    use super::*;

    mock! {
        pub Session {}

        #[async_trait]
        impl ToolSession for Session {
            async fn invoke(&self, name: &str, arguments: Option<Map<String, Value>>) -> Res<ToolOutcome>;
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("The {name} tool."),
            input_schema: json!({ "type": "object" }),
        }
    }

    fn session_returning(text: &'static str) -> Arc<dyn ToolSession> {
        let mut session = MockSession::new();
        session.expect_invoke().returning(move |_, _| Ok(ToolOutcome::Success(text.to_string())));
        Arc::new(session)
    }

    #[test]
    fn test_descriptor_from_listing() {
        let listing = json!({
            "name": "search_code",
            "description": "Search code.",
            "inputSchema": { "type": "object", "properties": { "q": { "type": "string" } } }
        });

        let descriptor = ToolDescriptor::from_listing(&listing).unwrap();

        assert_eq!(descriptor.name, "search_code");
        assert_eq!(descriptor.input_schema["properties"]["q"]["type"], "string");
        assert!(ToolDescriptor::from_listing(&json!({ "description": "nameless" })).is_none());
    }

    #[test]
    fn test_load_mcp_json_merges_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_config.json");
        std::fs::write(
            &path,
            json!({
                "servers": { "wiki": { "url": "https://mcp.example.com/mcp" } },
                "mcpServers": { "github": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-github"] } }
            })
            .to_string(),
        )
        .unwrap();

        let json = load_mcp_json(&path);

        assert_eq!(json.len(), 2);
        assert_eq!(json["github"]["command"], "npx");
    }

    #[test]
    fn test_load_mcp_json_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_mcp_json(dir.path().join("absent.json")).is_empty());
        assert!(load_mcp_json(&path).is_empty());
    }

    #[test]
    fn test_get_servers_skips_invalid_entries() {
        let json = json!({
            "github": { "command": "npx", "args": ["-y", "server"], "env": { "TOKEN": "x" } },
            "wiki": { "url": "https://mcp.example.com/mcp" },
            "broken": { "nothing": true }
        });

        let servers = get_servers_from_mcp_json(json.as_object().unwrap().clone());

        assert_eq!(servers.len(), 2);
        assert!(servers.iter().any(|s| s.name == "github" && matches!(s.config, McpServerConfig::Local { .. })));
        assert!(servers.iter().any(|s| s.name == "wiki" && matches!(s.config, McpServerConfig::Remote { .. })));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: this variable name is unique to this test.
        unsafe { std::env::set_var("ONCALL_BOT_TEST_GITHUB_TOKEN", "ghp_123") };

        let expanded = expand_env_vars(json!({
            "command": "npx",
            "env": { "GITHUB_TOKEN": "${ONCALL_BOT_TEST_GITHUB_TOKEN}", "OTHER": "pre-${ONCALL_BOT_TEST_UNSET_VARIABLE}-post" },
            "args": ["${ONCALL_BOT_TEST_GITHUB_TOKEN}", 3]
        }))
        .unwrap();

        assert_eq!(expanded["env"]["GITHUB_TOKEN"], "ghp_123");
        assert_eq!(expanded["env"]["OTHER"], "pre--post");
        assert_eq!(expanded["args"], json!(["ghp_123", 3]));
    }

    #[test]
    fn test_truncate_tool_result() {
        let short = "a".repeat(MAX_TOOL_RESULT_CHARS);
        assert_eq!(truncate_tool_result(short.clone()), short);

        let long = "b".repeat(MAX_TOOL_RESULT_CHARS + 250);
        let truncated = truncate_tool_result(long);

        assert!(truncated.starts_with(&"b".repeat(MAX_TOOL_RESULT_CHARS)));
        assert!(truncated.ends_with("\n\n[... truncated 250 characters ...]"));
    }

    #[test]
    fn test_extract_text() {
        let result = json!({
            "content": [{ "type": "text", "text": "one" }, { "type": "text", "text": "two" }],
            "isError": false
        });

        assert_eq!(extract_text(&result), "one\ntwo");
        assert_eq!(extract_text(&json!({})), "");
    }

    #[test]
    fn test_outcome_content() {
        assert_eq!(ToolOutcome::Success("ok".to_string()).into_content("t"), ("ok".to_string(), false));
        assert_eq!(ToolOutcome::Failed("boom".to_string()).into_content("t"), ("Error: boom".to_string(), true));
        assert_eq!(ToolOutcome::Unavailable.into_content("missing"), ("Error: Tool missing not available".to_string(), true));
    }

    #[tokio::test]
    async fn test_registry_routes_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register("github", session_returning("from github"), vec![descriptor("search_code")]);
        registry.register("wiki", session_returning("from wiki"), vec![descriptor("ask_question")]);

        assert_eq!(registry.tools().len(), 2);
        assert_eq!(registry.invoke("search_code", &json!({ "q": "auth" })).await, ToolOutcome::Success("from github".to_string()));
        assert_eq!(registry.invoke("ask_question", &Value::Null).await, ToolOutcome::Success("from wiki".to_string()));
    }

    #[tokio::test]
    async fn test_registry_collision_last_writer_wins() {
        let mut registry = ToolRegistry::default();
        registry.register("first", session_returning("first"), vec![descriptor("search")]);
        registry.register("second", session_returning("second"), vec![descriptor("search")]);

        assert_eq!(registry.tools().len(), 1);
        assert_eq!(registry.owner("search"), Some("second"));
        assert_eq!(registry.invoke("search", &json!({})).await, ToolOutcome::Success("second".to_string()));
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_is_unavailable() {
        let registry = ToolRegistry::default();

        assert_eq!(registry.invoke("nope", &json!({})).await, ToolOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_registry_session_error_is_failed() {
        let mut session = MockSession::new();
        session
            .expect_invoke()
            .with(eq("search_code"), eq(Some(json!({ "q": "x" }).as_object().unwrap().clone())))
            .returning(|_, _| Err(anyhow::anyhow!("session closed")));

        let mut registry = ToolRegistry::default();
        registry.register("github", Arc::new(session), vec![descriptor("search_code")]);

        assert_eq!(registry.invoke("search_code", &json!({ "q": "x" })).await, ToolOutcome::Failed("session closed".to_string()));
    }

    #[tokio::test]
    async fn test_registry_truncates_output() {
        let mut session = MockSession::new();
        session.expect_invoke().returning(|_, _| Ok(ToolOutcome::Success("z".repeat(MAX_TOOL_RESULT_CHARS + 1))));

        let mut registry = ToolRegistry::default();
        registry.register("github", Arc::new(session), vec![descriptor("get_file_contents")]);

        let ToolOutcome::Success(text) = registry.invoke("get_file_contents", &json!({})).await else {
            panic!("expected success");
        };

        assert!(text.ends_with("[... truncated 1 characters ...]"));
    }

    #[tokio::test]
    async fn test_connect_with_unreachable_servers_is_empty() {
        let servers = vec![McpServer {
            name: "ghost".to_string(),
            config: McpServerConfig::Local {
                command: "/nonexistent/oncall-bot-test-binary".to_string(),
                args: Vec::new(),
                env: None,
            },
        }];

        let registry = connect_servers(servers).await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_client_connect_is_idempotent_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let client = McpClient::new(dir.path().join("server_config.json"));

        assert!(client.available_tools().is_empty());
        assert!(client.connect().await.is_empty());
        assert!(client.connect().await.is_empty());
        assert_eq!(client.invoke("anything", &json!({})).await, ToolOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_client_from_registry() {
        let mut registry = ToolRegistry::default();
        registry.register("github", session_returning("hit"), vec![descriptor("search_code")]);

        let client = McpClient::from_registry(registry);

        assert_eq!(client.available_tools().len(), 1);
        assert_eq!(client.invoke("search_code", &json!({})).await, ToolOutcome::Success("hit".to_string()));
    }
}
