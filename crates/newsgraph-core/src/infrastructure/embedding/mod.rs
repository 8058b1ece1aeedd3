//! Embedding backend implementations

mod ollama;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub use ollama::{OllamaBackend, OLLAMA_BASE_URL};
pub use openai::{OpenAiBackend, OPENAI_BASE_URL};

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use crate::domain::embedding::EmbeddingClient;
use crate::error::{Error, Result};

/// Build an embedding client from settings
///
/// No request is made here; the backend loads on first use.
pub fn client_from_settings(settings: &EmbeddingSettings) -> Result<EmbeddingClient> {
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));

    match settings.provider {
        EmbeddingProvider::OpenAi => {
            let api_key = settings
                .resolved_api_key()
                .map_err(|e| Error::ConfigError(e.to_string()))?;
            if api_key.is_none() {
                warn!("No embedding API key set, OpenAI embeddings will be unavailable");
            }
            let backend = OpenAiBackend::new(
                settings.model.clone(),
                api_key,
                settings.base_url.clone(),
                timeout,
            )?;
            Ok(EmbeddingClient::new(Arc::new(backend)))
        }
        EmbeddingProvider::Ollama => {
            let backend =
                OllamaBackend::new(settings.model.clone(), settings.base_url.clone(), timeout)?;
            Ok(EmbeddingClient::new(Arc::new(backend)))
        }
        EmbeddingProvider::Disabled => Ok(EmbeddingClient::disabled("embeddings disabled in configuration")),
    }
}
