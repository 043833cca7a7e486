//! Persistent vector index over the knowledge base chunks.
//!
//! Chunks are stored in a SurrealDB table alongside their embeddings and
//! ranked with cosine similarity at query time.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use surrealdb::{Surreal, engine::local::Db};
use tracing::{error, info, instrument, warn};

use crate::base::types::{Res, Void};

use super::{
    chunker::{self, DocumentChunk, TextSplitter},
    embedding::EmbeddingClient,
};

/// Replaces the whole collection in one transaction, so readers see either the old generation or the new one.
const REBUILD_QUERY: &str = r#"
BEGIN TRANSACTION;
DELETE type::table($table);
FOR $row IN $rows {
    CREATE type::table($table) CONTENT $row;
};
COMMIT TRANSACTION;
"#;

const SEARCH_QUERY: &str = r#"
SELECT content, source, chunk_index, vector::similarity::cosine(embedding, $query) AS score
FROM type::table($table)
ORDER BY score DESC
LIMIT $limit;
"#;

// Types.

/// A chunk as stored in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedChunk {
    content: String,
    source: String,
    chunk_index: i64,
    embedding: Vec<f32>,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub source: String,
    pub chunk_index: i64,
    pub score: f64,
}

// Structs.

/// The knowledge base vector index.
///
/// Constructed once per process; `initialize` rebuilds the collection from the document directory.
pub struct VectorIndex {
    db: Surreal<Db>,
    collection: String,
    embedder: EmbeddingClient,
    splitter: TextSplitter,
    ready: AtomicBool,
}

impl VectorIndex {
    pub fn new(db: Surreal<Db>, collection: impl Into<String>, embedder: EmbeddingClient) -> Self {
        Self {
            db,
            collection: collection.into(),
            embedder,
            splitter: TextSplitter::default(),
            ready: AtomicBool::new(false),
        }
    }

    /// Use a different splitter (e.g., smaller chunks).
    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Whether a generation has been successfully written.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Rebuild the collection from the documents in `directory`.
    ///
    /// Never fails: a missing credential, an empty directory, or a backend failure is logged and
    /// marks the index not ready, so retrieval returns nothing until a later rebuild succeeds.
    #[instrument(name = "VectorIndex::initialize", skip_all, fields(collection = %self.collection))]
    pub async fn initialize(&self, directory: &Path) {
        if !self.embedder.is_configured() {
            warn!("No embedding credentials are configured; the knowledge base stays empty.");
            self.ready.store(false, Ordering::Release);
            return;
        }

        let chunks = chunker::load_and_chunk(directory, &self.splitter);

        if chunks.is_empty() {
            warn!("No chunks were produced; the knowledge base stays empty.");
            self.ready.store(false, Ordering::Release);
            return;
        }

        match self.rebuild(chunks).await {
            Ok(count) => {
                self.ready.store(true, Ordering::Release);
                info!("Indexed {count} chunks.");
            }
            Err(e) => {
                self.ready.store(false, Ordering::Release);
                error!("Failed to rebuild the knowledge base: {e}");
            }
        }
    }

    /// Return up to `k` chunks, most similar first.  Failures yield no chunks.
    #[instrument(name = "VectorIndex::retrieve", skip(self, query))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        if k == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        if !self.is_ready() {
            warn!("The knowledge base has not been initialized.");
            return Vec::new();
        }

        match self.search(query, k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Knowledge base search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn rebuild(&self, chunks: Vec<DocumentChunk>) -> Res<usize> {
        // Embed before touching the store so a failed embedding never clears the live generation.
        let texts = chunks.iter().map(|chunk| chunk.content.clone()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(anyhow::anyhow!("Expected {} embeddings, received {}.", chunks.len(), embeddings.len()));
        }

        let indexed_at = chrono::Utc::now();
        let rows = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk {
                content: chunk.content,
                source: chunk.source,
                chunk_index: chunk.chunk_index as i64,
                embedding,
                indexed_at,
            })
            .collect::<Vec<_>>();

        let count = rows.len();

        self.write_generation(rows).await?;

        Ok(count)
    }

    async fn write_generation(&self, rows: Vec<IndexedChunk>) -> Void {
        self.db
            .query(REBUILD_QUERY)
            .bind(("table", self.collection.clone()))
            .bind(("rows", rows))
            .await?
            .check()?;

        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Res<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed_one(query).await?;

        let mut response = self
            .db
            .query(SEARCH_QUERY)
            .bind(("table", self.collection.clone()))
            .bind(("query", embedding))
            .bind(("limit", k as i64))
            .await?
            .check()?;

        let chunks: Vec<ScoredChunk> = response.take(0)?;

        Ok(chunks)
    }
}

// Tests.
