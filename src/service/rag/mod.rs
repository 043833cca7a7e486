//! Knowledge base retrieval (RAG).
//!
//! [`RagClient`] owns the [`VectorIndex`] and turns similarity search results
//! into a single context block plus deduplicated source citations.

pub mod chunker;
pub mod embedding;
pub mod index;

use std::{ops::Deref, path::Path, sync::Arc};

use surrealdb::{Surreal, engine::local::Db};
use tracing::{debug, info, instrument};

use crate::base::{config::Config, types::RagSource};

use embedding::EmbeddingClient;
use index::{ScoredChunk, VectorIndex};

/// Number of chunks retrieved per query.
pub const TOP_K: usize = 3;

// Types.

/// Retrieved knowledge base context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedContext {
    /// Nothing relevant was found (or retrieval was unavailable).
    None,
    /// Formatted context and the documents it came from.
    Found { context: String, sources: Vec<RagSource> },
}

impl RetrievedContext {
    pub fn none() -> Self {
        Self::None
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The formatted context block; empty when nothing was found.
    pub fn context(&self) -> &str {
        match self {
            Self::None => "",
            Self::Found { context, .. } => context,
        }
    }

    /// The cited sources; empty when nothing was found.
    pub fn sources(&self) -> &[RagSource] {
        match self {
            Self::None => &[],
            Self::Found { sources, .. } => sources,
        }
    }

    /// Build from ranked chunks, most similar first.
    pub fn from_chunks(chunks: &[ScoredChunk]) -> Self {
        if chunks.is_empty() {
            return Self::None;
        }

        let context = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("### Document {}: {}\n{}", i + 1, filename_of(&chunk.source), chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sources: Vec<RagSource> = Vec::new();

        for chunk in chunks {
            let filename = filename_of(&chunk.source);

            if !sources.iter().any(|source| source.filename == filename) {
                sources.push(RagSource::new(filename));
            }
        }

        Self::Found { context, sources }
    }
}

// Structs.

/// Knowledge base client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct RagClient {
    inner: Arc<VectorIndex>,
}

impl Deref for RagClient {
    type Target = VectorIndex;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl RagClient {
    pub fn new(index: VectorIndex) -> Self {
        Self { inner: Arc::new(index) }
    }

    /// Build the knowledge base over `db` with the configured collection and OpenAI embeddings.
    pub fn surreal(config: &Config, db: Surreal<Db>) -> Self {
        Self::new(VectorIndex::new(db, config.vector_collection.clone(), EmbeddingClient::openai(config)))
    }

    /// Rebuild the index from `directory`.
    pub async fn initialize(&self, directory: &Path) {
        self.inner.initialize(directory).await;
    }

    /// Retrieve the [`TOP_K`] most relevant chunks for `query`, formatted for a prompt.
    #[instrument(name = "RagClient::retrieve_context", skip_all)]
    pub async fn retrieve_context(&self, query: &str) -> RetrievedContext {
        let chunks = self.inner.retrieve(query, TOP_K).await;
        let context = RetrievedContext::from_chunks(&chunks);

        if context.is_empty() {
            debug!("No knowledge base context found.");
        } else {
            info!("Retrieved {} chunks from {} documents.", chunks.len(), context.sources().len());
        }

        context
    }
}

// Helpers.

/// The final path segment of a chunk source.
fn filename_of(source: &str) -> String {
    Path::new(source).file_name().map_or_else(|| source.to_string(), |name| name.to_string_lossy().to_string())
}


// Tests.
