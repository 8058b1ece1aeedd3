//! Lazily initialized embedding client
//!
//! The backend is loaded on the first `embed` call. Concurrent first calls
//! share one load; a failed load disables the client for its lifetime.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::backend::EmbeddingBackend;
use crate::error::{Error, Result};

/// Outcome of the one-time backend load: the dimension, or why it failed
type LoadState = std::result::Result<usize, String>;

/// Embedding client wrapping one backend
pub struct EmbeddingClient {
    backend: Option<Arc<dyn EmbeddingBackend>>,
    state: OnceCell<LoadState>,
}

impl EmbeddingClient {
    /// Create a client; nothing is loaded until the first call
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend: Some(backend),
            state: OnceCell::new(),
        }
    }

    /// Create a client that is permanently disabled
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            state: OnceCell::new_with(Some(Err(reason.into()))),
        }
    }

    /// Identifier of the wrapped backend
    pub fn backend_id(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.identifier())
    }

    /// Whether a load was attempted and failed
    pub fn is_disabled(&self) -> bool {
        matches!(self.state.get(), Some(Err(_)))
    }

    /// Output dimension, once loaded
    pub fn dimension(&self) -> Option<usize> {
        match self.state.get() {
            Some(Ok(dimension)) => Some(*dimension),
            _ => None,
        }
    }

    async fn ensure_loaded(&self) -> Result<(&Arc<dyn EmbeddingBackend>, usize)> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| Error::EmbeddingUnavailable("no backend configured".to_string()))?;

        let state = self
            .state
            .get_or_init(|| async {
                match backend.load().await {
                    Ok(dimension) => {
                        info!(backend = %backend.identifier(), dimension, "Embedding backend loaded");
                        Ok(dimension)
                    }
                    Err(e) => {
                        warn!(
                            backend = %backend.identifier(),
                            error = %e,
                            "Embedding backend failed to load, disabling embeddings"
                        );
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match state {
            Ok(dimension) => Ok((backend, *dimension)),
            Err(reason) => Err(Error::EmbeddingUnavailable(reason.clone())),
        }
    }

    /// Embed one text
    ///
    /// Transport failures after a successful load surface as
    /// [`Error::EmbeddingUnavailable`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let (backend, dimension) = self.ensure_loaded().await?;

        // a backend that loaded but can no longer be reached is an outage
        let vector = backend.embed(text).await.map_err(|e| match e {
            Error::NetworkError(inner) => Error::EmbeddingUnavailable(format!(
                "{} unreachable: {}",
                backend.identifier(),
                inner
            )),
            other => other,
        })?;
        if vector.len() != dimension {
            return Err(Error::EmbeddingFailed(format!(
                "backend {} returned {} dimensions, expected {}",
                backend.identifier(),
                vector.len(),
                dimension
            )));
        }
        Ok(vector)
    }
}
