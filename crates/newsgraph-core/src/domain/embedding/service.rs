//! Entity embedding generation and similarity search

use std::cmp::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::EmbeddingClient;
use super::similarity::cosine_similarity;
use crate::domain::knowledge::{Entity, EntityType, GraphRepository};
use crate::error::{Error, Result};

/// An entity ranked by embedding similarity
#[derive(Debug, Clone)]
pub struct SimilarEntity {
    pub entity: Entity,
    pub similarity: f32,
}

/// Counts from one embedding regeneration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingReport {
    pub candidates: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Text fed to the embedding model for an entity
///
/// Companies also carry their enrichment summary.
pub fn embedding_text(entity: &Entity) -> String {
    let mut text = format!("{} ({})", entity.name, entity.entity_type);
    if !entity.description.is_empty() {
        text.push_str(": ");
        text.push_str(&entity.description);
    }
    if entity.entity_type == EntityType::Company {
        if let Some(enrichment) = &entity.enrichment {
            let summary = enrichment.summary();
            if !summary.is_empty() {
                text.push_str(". ");
                text.push_str(&summary);
            }
        }
    }
    text
}

/// Entity embedding service
pub struct EmbeddingService<R: GraphRepository> {
    repository: Arc<R>,
    client: Arc<EmbeddingClient>,
}

impl<R: GraphRepository> EmbeddingService<R> {
    pub fn new(repository: Arc<R>, client: Arc<EmbeddingClient>) -> Self {
        Self { repository, client }
    }

    /// The wrapped client
    pub fn client(&self) -> &Arc<EmbeddingClient> {
        &self.client
    }

    /// Entities most similar to a free-text query
    ///
    /// Stored vectors whose dimension differs from the query vector are
    /// skipped. The type filter applies after ranking.
    pub async fn find_similar_entities(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<EntityType>,
    ) -> Result<Vec<SimilarEntity>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.client.embed(query).await?;
        let stored = self.repository.list_entity_embeddings().await?;

        let mut skipped = 0usize;
        let mut scored: Vec<(String, f32)> = Vec::with_capacity(stored.len());
        for embedding in stored {
            if embedding.vector.len() != query_vector.len() {
                skipped += 1;
                continue;
            }
            let similarity = cosine_similarity(&query_vector, &embedding.vector);
            scored.push((embedding.entity_id, similarity));
        }
        if skipped > 0 {
            debug!(skipped, "Skipped entity embeddings with mismatched dimensions");
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut results = Vec::with_capacity(limit.min(scored.len()));
        for (entity_id, similarity) in scored {
            if results.len() >= limit {
                break;
            }
            let Some(entity) = self.repository.get_entity(&entity_id).await? else {
                continue;
            };
            if type_filter.is_some_and(|t| t != entity.entity_type) {
                continue;
            }
            results.push(SimilarEntity { entity, similarity });
        }

        Ok(results)
    }

    /// Regenerate and store embeddings for every matching entity
    ///
    /// Each entity is isolated: a failed embed is logged and counted. Fails
    /// early when the backend cannot load, and with [`Error::Cancelled`]
    /// when the token fires between entities.
    pub async fn generate_for_all(
        &self,
        type_filter: Option<EntityType>,
        cancel: &CancellationToken,
    ) -> Result<EmbeddingReport> {
        let entities = self.repository.list_entities(type_filter).await?;
        let mut report = EmbeddingReport {
            candidates: entities.len(),
            ..Default::default()
        };

        info!(candidates = report.candidates, "Generating entity embeddings");

        for entity in &entities {
            if cancel.is_cancelled() {
                info!(stored = report.stored, "Embedding generation cancelled");
                return Err(Error::Cancelled);
            }

            let vector = match self.client.embed(&embedding_text(entity)).await {
                Ok(vector) => vector,
                Err(e @ Error::EmbeddingUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "Failed to embed entity");
                    report.failed += 1;
                    continue;
                }
            };

            let backend = self.client.backend_id().unwrap_or("unknown");
            match self
                .repository
                .save_entity_embedding(&entity.id, &vector, backend)
                .await
            {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "Failed to store entity embedding");
                    report.failed += 1;
                }
            }
        }

        info!(
            stored = report.stored,
            failed = report.failed,
            "Entity embeddings generated"
        );
        Ok(report)
    }
}
