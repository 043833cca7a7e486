//! Text embeddings for the knowledge base.

use std::{ops::Deref, sync::Arc};

use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::base::{config::Config, types::Res};

/// Maximum number of inputs per embeddings request.
const EMBEDDING_BATCH_SIZE: usize = 96;

// Traits.

/// Generic embedding client trait that embedding backends must implement.
#[async_trait]
pub trait GenericEmbeddingClient: Send + Sync + 'static {
    /// Whether the backend has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// Embed each text, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Res<Vec<Vec<f32>>>;
}

// Structs.

/// Embedding client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct EmbeddingClient {
    inner: Arc<dyn GenericEmbeddingClient>,
}

impl Deref for EmbeddingClient {
    type Target = dyn GenericEmbeddingClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl EmbeddingClient {
    pub fn new(inner: Arc<dyn GenericEmbeddingClient>) -> Self {
        Self { inner }
    }

    pub fn openai(config: &Config) -> Self {
        Self::new(Arc::new(OpenAiEmbeddingClient::new(config)))
    }

    /// Embed a single query string.
    pub async fn embed_one(&self, text: &str) -> Res<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding backend returned no vector."))
    }
}

// Specific implementations.

/// OpenAI embeddings implementation.
pub struct OpenAiEmbeddingClient {
    client: Client<OpenAIConfig>,
    model: String,
    configured: bool,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            model: config.embedding_model.clone(),
            configured: !config.openai_api_key.is_empty(),
        }
    }
}

#[async_trait]
impl GenericEmbeddingClient for OpenAiEmbeddingClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    #[instrument(name = "OpenAiEmbeddingClient::embed", skip_all, fields(count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Res<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let request = CreateEmbeddingRequestArgs::default().model(&self.model).input(batch.to_vec()).build()?;
            let mut response = self.client.embeddings().create(request).await?;

            if response.data.len() != batch.len() {
                return Err(anyhow::anyhow!("Expected {} embeddings, received {}.", batch.len(), response.data.len()));
            }

            response.data.sort_by_key(|embedding| embedding.index);
            vectors.extend(response.data.into_iter().map(|embedding| embedding.embedding));

            debug!("Embedded a batch of {} texts.", batch.len());
        }

        Ok(vectors)
    }
}

// Tests.
