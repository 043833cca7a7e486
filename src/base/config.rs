//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    base::prompts,
    service::{db::surreal::PREFERENCE_TABLE, llm},
};

use super::types::Res;

/// Default provider for users without a stored preference.
fn default_provider() -> String {
    llm::anthropic::PROVIDER_NAME.to_string()
}

/// Default model for users without a stored preference.
fn default_model() -> String {
    "claude-3-5-sonnet-20240620".to_string()
}

/// Default OpenAI embedding model used by the knowledge base.
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default knowledge base document directory.
fn default_docs_directory() -> PathBuf {
    PathBuf::from("data/docs")
}

/// Default on-disk database directory.
fn default_db_path() -> PathBuf {
    PathBuf::from("data/surreal")
}

/// Default vector collection name.
fn default_vector_collection() -> String {
    "knowledge_docs".to_string()
}

/// Default MCP server configuration file.
fn default_mcp_config_path() -> PathBuf {
    PathBuf::from("server_config.json")
}

/// Default branch for knowledge base citation links.
fn default_docs_repo_branch() -> String {
    "main".to_string()
}

/// Default repository directory for knowledge base citation links.
fn default_docs_repo_path() -> String {
    "data/docs".to_string()
}

/// Default system directive.
fn default_system_directive() -> String {
    prompts::DEFAULT_SYSTEM_DIRECTIVE.to_string()
}

/// Default DM directive.
fn default_dm_system_directive() -> String {
    prompts::DM_SYSTEM_DIRECTIVE.to_string()
}

/// Default `/incident` directive.
fn default_incident_system_directive() -> String {
    prompts::INCIDENT_RESPONSE_SYSTEM_DIRECTIVE.to_string()
}

/// Default `/code` directive.
fn default_code_system_directive() -> String {
    prompts::CODE_ANALYSIS_SYSTEM_DIRECTIVE.to_string()
}

/// Configuration for the oncall-bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Shared configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The configuration values behind [`Config`].
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Anthropic API key (`ANTHROPIC_API_KEY`).
    #[serde(default)]
    pub anthropic_api_key: String,
    /// OpenAI API key (`OPENAI_API_KEY`); also the embedding credential for the knowledge base.
    #[serde(default)]
    pub openai_api_key: String,
    /// Provider used when a user has no stored preference (`DEFAULT_PROVIDER`).
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used when a user has no stored preference (`DEFAULT_MODEL`).
    #[serde(default = "default_model")]
    pub default_model: String,
    /// OpenAI embedding model for the knowledge base (`EMBEDDING_MODEL`).
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Directory holding the knowledge base markdown documents (`DOCS_DIRECTORY`).
    #[serde(default = "default_docs_directory")]
    pub docs_directory: PathBuf,
    /// On-disk database directory (`DB_PATH`).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Name of the vector collection (`VECTOR_COLLECTION`).
    #[serde(default = "default_vector_collection")]
    pub vector_collection: String,
    /// Path to the MCP server JSON configuration (`MCP_CONFIG_PATH`).
    #[serde(default = "default_mcp_config_path")]
    pub mcp_config_path: PathBuf,
    /// GitHub owner of the knowledge base repository, for citation links (`DOCS_REPO_OWNER`).
    #[serde(default)]
    pub docs_repo_owner: Option<String>,
    /// GitHub name of the knowledge base repository, for citation links (`DOCS_REPO_NAME`).
    #[serde(default)]
    pub docs_repo_name: Option<String>,
    /// Branch of the knowledge base repository (`DOCS_REPO_BRANCH`).
    #[serde(default = "default_docs_repo_branch")]
    pub docs_repo_branch: String,
    /// Directory of the documents inside the repository (`DOCS_REPO_PATH`).
    #[serde(default = "default_docs_repo_path")]
    pub docs_repo_path: String,
    /// Optional custom system directive to override the default (`SYSTEM_DIRECTIVE`).
    #[serde(default = "default_system_directive")]
    pub system_directive: String,
    /// Optional custom DM directive to override the default (`DM_SYSTEM_DIRECTIVE`).
    #[serde(default = "default_dm_system_directive")]
    pub dm_system_directive: String,
    /// Optional custom `/incident` directive to override the default (`INCIDENT_SYSTEM_DIRECTIVE`).
    #[serde(default = "default_incident_system_directive")]
    pub incident_system_directive: String,
    /// Optional custom `/code` directive to override the default (`CODE_SYSTEM_DIRECTIVE`).
    #[serde(default = "default_code_system_directive")]
    pub code_system_directive: String,
    /// Slack app token (`SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            openai_api_key: String::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            embedding_model: default_embedding_model(),
            docs_directory: default_docs_directory(),
            db_path: default_db_path(),
            vector_collection: default_vector_collection(),
            mcp_config_path: default_mcp_config_path(),
            docs_repo_owner: None,
            docs_repo_name: None,
            docs_repo_branch: default_docs_repo_branch(),
            docs_repo_path: default_docs_repo_path(),
            system_directive: default_system_directive(),
            dm_system_directive: default_dm_system_directive(),
            incident_system_directive: default_incident_system_directive(),
            code_system_directive: default_code_system_directive(),
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
        }
    }
}

impl Config {
    /// Load the configuration.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("ONCALL_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the settings that would otherwise only fail on the first request.
    pub fn validate(&self) -> Res<()> {
        if llm::find_model(&self.default_provider, &self.default_model).is_none() {
            return Err(anyhow::anyhow!(
                "Default model `{}` is not offered by provider `{}`.",
                self.default_model,
                self.default_provider
            ));
        }

        if self.vector_collection.is_empty() || !self.vector_collection.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow::anyhow!("Vector collection name must be non-empty and contain only ASCII letters, digits, and underscores."));
        }

        // The rebuild empties the whole collection table.
        if self.vector_collection.eq_ignore_ascii_case(PREFERENCE_TABLE) {
            return Err(anyhow::anyhow!("Vector collection name `{}` is reserved for user preferences.", self.vector_collection));
        }

        Ok(())
    }

    /// Link to a knowledge base document, when the docs repository is configured.
    pub fn docs_url(&self, filename: &str) -> Option<String> {
        let owner = self.docs_repo_owner.as_deref()?;
        let name = self.docs_repo_name.as_deref()?;
        let path = self.docs_repo_path.trim_matches('/');

        let url = if path.is_empty() {
            format!("https://github.com/{owner}/{name}/blob/{}/{filename}", self.docs_repo_branch)
        } else {
            format!("https://github.com/{owner}/{name}/blob/{}/{path}/{filename}", self.docs_repo_branch)
        };

        Some(url)
    }
}

// Tests.
