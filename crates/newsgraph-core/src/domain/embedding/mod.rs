//! Embeddings for entities and queries
//!
//! One pluggable [`EmbeddingBackend`] sits behind an [`EmbeddingClient`] that
//! loads it lazily. [`EmbeddingService`] stores entity vectors and ranks
//! entities against a query.

mod backend;
mod client;
mod service;
mod similarity;

pub use backend::EmbeddingBackend;
pub use client::EmbeddingClient;
pub use service::{embedding_text, EmbeddingReport, EmbeddingService, SimilarEntity};
pub use similarity::cosine_similarity;
