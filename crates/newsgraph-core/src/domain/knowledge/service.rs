//! Knowledge graph ingest service
//!
//! The write path used by the extraction pipeline: entity mentions upsert by
//! normalized name and type, relationship observations upsert by
//! `(source, target, type)`, and company enrichment overlays onto the stored
//! record.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::resolution::EntityLockTable;
use crate::error::{Error, Result};

use super::article::Article;
use super::entity::{CompanyEnrichment, Entity, EntityType};
use super::normalizer::normalize;
use super::relationship::{validate_strength, Relationship, RelationshipType};
use super::repository::GraphRepository;

/// An entity as delivered by the extraction pipeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityRecord {
    pub name: String,
    /// Entity type name, any case
    pub entity_type: String,
    pub description: String,
}

/// A relationship as delivered by the extraction pipeline
///
/// Endpoints are named, not identified; each must match an entity recorded
/// earlier in the same batch or already in the graph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelationshipRecord {
    pub source: String,
    pub source_type: String,
    pub target: String,
    pub target_type: String,
    /// Relationship type name, any case
    pub relationship_type: String,
    pub description: String,
    pub strength: Option<f64>,
}

/// Everything extracted from one article
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestBatch {
    pub article: Option<Article>,
    pub entities: Vec<EntityRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

/// Which list a rejected record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Entity,
    Relationship,
}

/// A record that failed validation or could not be written
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub kind: RecordKind,
    /// Position in its list
    pub index: usize,
    pub code: &'static str,
    pub reason: String,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub article_id: Option<String>,
    pub entities_recorded: usize,
    pub relationships_recorded: usize,
    pub rejected: Vec<RejectedRecord>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

fn parse_entity_type(name: &str) -> Result<EntityType> {
    EntityType::parse(name)
        .ok_or_else(|| Error::InvalidRecord(format!("unknown entity type '{}'", name)))
}

fn parse_relationship_type(name: &str) -> Result<RelationshipType> {
    RelationshipType::parse(name).ok_or_else(|| Error::InvalidRelationshipType(name.to_string()))
}

/// Knowledge graph write service
pub struct KnowledgeGraphService<R: GraphRepository> {
    repository: Arc<R>,
    locks: EntityLockTable,
}

impl<R: GraphRepository> KnowledgeGraphService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            locks: EntityLockTable::new(),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Find an entity by name and type
    ///
    /// Matches on the normalized name, so "Anthropic, Inc." finds "Anthropic".
    pub async fn find_entity(&self, name: &str, entity_type: EntityType) -> Result<Option<Entity>> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return Ok(None);
        }
        self.repository
            .get_entity_by_normalized_name(&normalized, Some(entity_type))
            .await
    }

    // ========== Entity Operations ==========

    /// Record one mention of an entity
    ///
    /// A known entity gains a mention, the description fragment and the
    /// article; an unknown one is created.
    pub async fn record_entity_mention(
        &self,
        name: &str,
        entity_type: EntityType,
        description: &str,
        article_id: Option<&str>,
    ) -> Result<Entity> {
        let candidate = Entity::new(name, entity_type);
        candidate.validate()?;

        let _guard = self.locks.lock_all(&[candidate.id.as_str()]).await;

        let entity = match self.find_entity(name, entity_type).await? {
            Some(mut existing) => {
                existing.observe(description, article_id);
                debug!(
                    entity_id = %existing.id,
                    mentions = existing.mention_count,
                    "Entity mention recorded"
                );
                existing
            }
            None => {
                let mut entity = candidate.with_description(description.trim());
                if let Some(article_id) = article_id {
                    entity.add_source_article(article_id.to_string());
                }
                debug!(entity_id = %entity.id, entity_name = %entity.name, "New entity recorded");
                entity
            }
        };

        self.repository.save_entity(&entity).await?;
        Ok(entity)
    }

    /// Overlay enrichment onto a company
    pub async fn apply_enrichment(
        &self,
        entity_id: &str,
        enrichment: &CompanyEnrichment,
    ) -> Result<Entity> {
        enrichment.validate()?;

        let _guard = self.locks.lock_all(&[entity_id]).await;
        let mut entity = self
            .repository
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| Error::EntityNotFound(entity_id.to_string()))?;

        if entity.entity_type != EntityType::Company {
            return Err(Error::InvalidRecord(format!(
                "enrichment is only allowed on companies, not {}",
                entity.entity_type
            )));
        }

        match entity.enrichment.as_mut() {
            Some(existing) => existing.merge_from(enrichment)?,
            None => entity.enrichment = Some(enrichment.clone()),
        }
        entity.validate()?;
        self.repository.save_entity(&entity).await?;

        info!(entity_id = %entity.id, entity_name = %entity.name, "Enrichment applied");
        Ok(entity)
    }

    // ========== Relationship Operations ==========

    /// Record one observation of a relationship between known entities
    ///
    /// Repeated observations average the strength, append the description
    /// and count towards the frequency factor.
    pub async fn record_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        description: &str,
        article_id: Option<&str>,
    ) -> Result<Relationship> {
        self.record_relationship_with_strength(
            source_id,
            target_id,
            relationship_type,
            description,
            article_id,
            None,
        )
        .await
    }

    async fn record_relationship_with_strength(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        description: &str,
        article_id: Option<&str>,
        strength: Option<f64>,
    ) -> Result<Relationship> {
        for id in [source_id, target_id] {
            if self.repository.get_entity(id).await?.is_none() {
                return Err(Error::EntityNotFound(id.to_string()));
            }
        }

        let mut relationship = Relationship::new(source_id, target_id, relationship_type)
            .with_description(description.trim());
        if let Some(strength) = strength {
            validate_strength(strength)?;
            relationship = relationship.with_strength(strength);
        }
        if let Some(article_id) = article_id {
            relationship = relationship.with_source_article(article_id);
        }

        self.repository.observe_relationship(&relationship).await
    }

    // ========== Batch Ingest ==========

    /// Ingest everything extracted from one article
    ///
    /// Invalid records are rejected and reported while the rest of the batch
    /// is written. An unavailable store aborts the batch.
    pub async fn ingest(&self, batch: IngestBatch) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        let article_id = match &batch.article {
            Some(article) => {
                if article.id.trim().is_empty() {
                    return Err(Error::InvalidRecord("article id is empty".to_string()));
                }
                self.repository.save_article(article).await?;
                Some(article.id.clone())
            }
            None => None,
        };
        report.article_id = article_id.clone();

        for (index, record) in batch.entities.iter().enumerate() {
            let outcome = async {
                let entity_type = parse_entity_type(&record.entity_type)?;
                self.record_entity_mention(
                    &record.name,
                    entity_type,
                    &record.description,
                    article_id.as_deref(),
                )
                .await
            }
            .await;

            match outcome {
                Ok(_) => report.entities_recorded += 1,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => {
                    warn!(index, name = %record.name, error = %e, "Entity record rejected");
                    report.rejected.push(RejectedRecord {
                        kind: RecordKind::Entity,
                        index,
                        code: e.code(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (index, record) in batch.relationships.iter().enumerate() {
            let outcome = async {
                let relationship_type = parse_relationship_type(&record.relationship_type)?;
                let source = self.resolve_endpoint(&record.source, &record.source_type).await?;
                let target = self.resolve_endpoint(&record.target, &record.target_type).await?;
                self.record_relationship_with_strength(
                    &source.id,
                    &target.id,
                    relationship_type,
                    &record.description,
                    article_id.as_deref(),
                    record.strength,
                )
                .await
            }
            .await;

            match outcome {
                Ok(_) => report.relationships_recorded += 1,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => {
                    warn!(
                        index,
                        source = %record.source,
                        target = %record.target,
                        error = %e,
                        "Relationship record rejected"
                    );
                    report.rejected.push(RejectedRecord {
                        kind: RecordKind::Relationship,
                        index,
                        code: e.code(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            article_id = ?report.article_id,
            entities = report.entities_recorded,
            relationships = report.relationships_recorded,
            rejected = report.rejected.len(),
            "Batch ingested"
        );
        Ok(report)
    }

    async fn resolve_endpoint(&self, name: &str, entity_type: &str) -> Result<Entity> {
        let entity_type = parse_entity_type(entity_type)?;
        self.find_entity(name, entity_type)
            .await?
            .ok_or_else(|| Error::EntityNotFound(format!("{} ({})", name, entity_type)))
    }
}
