//! Embedding backend seam

use async_trait::async_trait;

use crate::error::Result;

/// A text-to-vector model
///
/// The output dimension is fixed for one backend instance and differs across
/// backends, so stored vectors are tagged with [`EmbeddingBackend::identifier`].
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Stable identifier stored beside every vector, e.g. `ollama:nomic-embed-text`
    fn identifier(&self) -> &str;

    /// One-time initialization; returns the output dimension
    async fn load(&self) -> Result<usize>;

    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
