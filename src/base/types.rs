use serde::{Deserialize, Serialize};

/// Crate-wide error type.
pub type Err = anyhow::Error;
/// Crate-wide result type.
pub type Res<T> = Result<T, Err>;
/// Result with no value.
pub type Void = Res<()>;

/// A knowledge-base document cited by a retrieval-augmented response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagSource {
    /// Final path segment of the source document (e.g., `kafka_backlog.md`).
    pub filename: String,
    /// Optional link to the document, attached by the chat boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RagSource {
    /// Create a source with no URL.
    pub fn new(filename: impl Into<String>) -> Self {
        Self { filename: filename.into(), url: None }
    }
}

/// What the core hands back to the chat boundary for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The final answer text; never empty.
    pub response: String,
    /// Cited knowledge-base documents, possibly empty.
    pub rag_sources: Vec<RagSource>,
    /// The provider that produced the answer (e.g., `anthropic`).
    pub provider: String,
}
