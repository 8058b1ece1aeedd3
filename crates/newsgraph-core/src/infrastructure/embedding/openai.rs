//! OpenAI-compatible embeddings endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::domain::embedding::EmbeddingBackend;
use crate::error::{Error, Result};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Backend calling `POST {base_url}/embeddings`
pub struct OpenAiBackend {
    http_client: HttpClient,
    base_url: String,
    model: String,
    api_key: Option<String>,
    identifier: String,
}

impl OpenAiBackend {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            identifier: format!("openai:{}", model),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn load(&self) -> Result<usize> {
        if self.api_key.is_none() {
            return Err(Error::EmbeddingUnavailable(
                "no API key in NEWSGRAPH_EMBEDDING_API_KEY or OPENAI_API_KEY".to_string(),
            ));
        }
        let sample = self.embed("dimension check").await?;
        Ok(sample.len())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::EmbeddingUnavailable("no API key".to_string()))?;

        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: [text],
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
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::EmbeddingFailed("no embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_and_base_url() {
        let backend = OpenAiBackend::new(
            "text-embedding-3-small",
            None,
            Some("http://localhost:8080/v1/".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.identifier(), "openai:text-embedding-3-small");
        assert_eq!(backend.base_url, "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn test_load_without_key_fails_before_any_request() {
        let backend =
            OpenAiBackend::new("text-embedding-3-small", None, None, Duration::from_secs(5)).unwrap();
        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,-0.2]}],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, -0.2]);
    }
}
