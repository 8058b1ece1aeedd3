//! Infrastructure layer
//!
//! Implementations for external systems: the SQLite graph and document
//! stores, embedding backends and the remote analytics service.

pub mod analytics;
pub mod documents;
pub mod embedding;
pub(crate) mod embedding_blob;
pub mod knowledge;
