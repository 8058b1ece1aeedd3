//! Knowledge graph domain module
//!
//! Typed property graph of entities extracted from news articles.
//!
//! - **Normalization**: canonical names and deterministic entity ids
//! - **Entities and relationships**: the 8 node types and 16 edge types
//! - **Repositories**: storage seams for the graph and for article chunks
//! - **Ingest**: the write path used by the extraction pipeline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newsgraph_core::domain::knowledge::{EntityType, KnowledgeGraphService, RelationshipType};
//!
//! let service = KnowledgeGraphService::new(repository);
//! let anthropic = service
//!     .record_entity_mention("Anthropic, Inc.", EntityType::Company, "AI safety company", Some("art-1"))
//!     .await?;
//! let google = service
//!     .record_entity_mention("Google", EntityType::Investor, "", Some("art-1"))
//!     .await?;
//! service
//!     .record_relationship(&anthropic.id, &google.id, RelationshipType::FundedBy, "Invested $300M", Some("art-1"))
//!     .await?;
//! ```

mod article;
mod entity;
pub mod normalizer;
mod relationship;
mod repository;
mod service;

pub use article::{parse_published_date, Article, ArticleChunk};
pub use entity::{
    CompanyEnrichment, EnrichmentStatus, Entity, EntityType, DESCRIPTION_SEPARATOR,
    MAX_EXTRA_PROPERTIES,
};
pub use relationship::{
    validate_strength, Relationship, RelationshipKey, RelationshipType, DEFAULT_STRENGTH,
    MAX_STRENGTH,
};
pub use repository::{
    ChunkMatch, DocumentRepository, EntityWithDistance, GraphRepository, GraphStats,
    MergeEdgeStats, PathRelationship, PathStep, StoredEmbedding, TraversalDirection,
};
pub use service::{
    EntityRecord, IngestBatch, IngestReport, KnowledgeGraphService, RecordKind, RejectedRecord,
    RelationshipRecord,
};
