//! Local model server with an Ollama-style embeddings endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::domain::embedding::EmbeddingBackend;
use crate::error::{Error, Result};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Backend calling `POST {base_url}/api/embeddings`
pub struct OllamaBackend {
    http_client: HttpClient,
    base_url: String,
    model: String,
    identifier: String,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let model = model.into();
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            identifier: format!("ollama:{}", model),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn load(&self) -> Result<usize> {
        // The first request makes the server load the model
        let sample = self.embed("dimension check").await?;
        Ok(sample.len())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .http_client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("{} unreachable: {}", self.identifier, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingFailed(format!(
                "{} returned {}: {}",
                self.identifier,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(Error::EmbeddingFailed(format!(
                "model {} returned an empty embedding",
                self.model
            )));
        }
        Ok(parsed.embedding)
    }
}
