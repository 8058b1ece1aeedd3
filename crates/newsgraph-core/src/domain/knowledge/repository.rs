//! Repository traits for knowledge graph persistence
//!
//! This module defines the storage seams used by the intelligence layer:
//! [`GraphRepository`] for entities and relationships and
//! [`DocumentRepository`] for article chunks. Query shapes are fixed per
//! method; callers pass values, never SQL fragments.

use async_trait::async_trait;

use crate::error::Result;

use super::article::{Article, ArticleChunk};
use super::entity::{Entity, EntityType};
use super::relationship::{Relationship, RelationshipKey, RelationshipType};

/// Repository trait for the entity graph
#[async_trait]
pub trait GraphRepository: Send + Sync {
    // ========== Entity Operations ==========

    /// Save an entity (insert or overwrite by id)
    async fn save_entity(&self, entity: &Entity) -> Result<()>;

    /// Get an entity by ID
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>>;

    /// Get an entity by normalized name, optionally restricted to one type
    async fn get_entity_by_normalized_name(
        &self,
        normalized_name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Option<Entity>>;

    /// List entities, optionally filtered by type
    async fn list_entities(&self, entity_type: Option<EntityType>) -> Result<Vec<Entity>>;

    /// Delete an entity and its edges
    async fn delete_entity(&self, id: &str) -> Result<bool>;

    /// Count entities
    async fn count_entities(&self) -> Result<u64>;

    /// Case-insensitive substring search over name and description
    async fn search_entities(&self, query: &str, limit: usize) -> Result<Vec<Entity>>;

    // ========== Relationship Operations ==========

    /// Save a relationship, overwriting strength and description on key conflict
    async fn save_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Record an observation of a relationship
    ///
    /// Inserts the edge if its key is new. Otherwise averages the stored
    /// strength with the observed one, appends the description and bumps the
    /// observation count. Returns the stored edge.
    async fn observe_relationship(&self, relationship: &Relationship) -> Result<Relationship>;

    /// Insert the edge unless one with the same key exists; true if inserted
    async fn insert_relationship_if_absent(&self, relationship: &Relationship) -> Result<bool>;

    /// Get a relationship by ID
    async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>>;

    /// Get the relationship with the given key
    async fn get_relationship_between(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>>;

    /// List relationships, optionally filtered by type
    async fn list_relationships(
        &self,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<Relationship>>;

    /// List all relationships for an entity (as source or target)
    async fn list_relationships_for_entity(&self, entity_id: &str) -> Result<Vec<Relationship>>;

    /// List outgoing relationships from an entity
    async fn list_outgoing_relationships(&self, entity_id: &str) -> Result<Vec<Relationship>>;

    /// List incoming relationships to an entity
    async fn list_incoming_relationships(&self, entity_id: &str) -> Result<Vec<Relationship>>;

    /// Number of times the edge with this key has been observed (0 if absent)
    async fn count_observations(&self, key: &RelationshipKey) -> Result<u64>;

    /// Overwrite the strength of one edge; false if the edge is gone
    async fn set_relationship_strength(&self, id: &str, strength: f64) -> Result<bool>;

    /// Delete a relationship by ID
    async fn delete_relationship(&self, id: &str) -> Result<bool>;

    /// Count relationships
    async fn count_relationships(&self) -> Result<u64>;

    // ========== Merge Operations ==========

    /// Fold `loser_id` into `survivor` in one transaction
    ///
    /// Writes the survivor record, redirects the loser's outgoing and
    /// incoming edges to the survivor unless an edge with the redirected key
    /// already exists, drops edges that would become survivor self-loops and
    /// deletes the loser.
    async fn merge_entities(&self, survivor: &Entity, loser_id: &str) -> Result<MergeEdgeStats>;

    // ========== Graph Traversal Operations ==========

    /// Get entities within N hops (edges followed in both directions)
    ///
    /// Uses a recursive CTE for graph traversal.
    async fn get_neighborhood(
        &self,
        start_entity_id: &str,
        max_depth: u32,
        relationship_types: Option<&[RelationshipType]>,
    ) -> Result<Vec<EntityWithDistance>>;

    /// Find the shortest undirected path between two entities
    async fn find_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_depth: u32,
    ) -> Result<Option<Vec<PathStep>>>;

    /// Get entities connected by a specific relationship type
    async fn get_connected_entities(
        &self,
        entity_id: &str,
        relationship_type: RelationshipType,
        direction: TraversalDirection,
    ) -> Result<Vec<Entity>>;

    // ========== Community Operations ==========

    /// Clear every community label and write the given assignments
    async fn replace_community_assignments(&self, assignments: &[(String, i64)]) -> Result<()>;

    /// List the members of a community
    async fn list_entities_in_community(&self, community_id: i64) -> Result<Vec<Entity>>;

    /// List `(community_id, member_count)` for every labelled community
    async fn list_communities(&self) -> Result<Vec<(i64, u64)>>;

    // ========== Entity Embedding Operations ==========

    /// Save (overwrite) the embedding for an entity
    async fn save_entity_embedding(
        &self,
        entity_id: &str,
        embedding: &[f32],
        backend: &str,
    ) -> Result<()>;

    /// Get the embedding for an entity
    async fn get_entity_embedding(&self, entity_id: &str) -> Result<Option<StoredEmbedding>>;

    /// Load every stored entity embedding
    async fn list_entity_embeddings(&self) -> Result<Vec<StoredEmbedding>>;

    // ========== Article Operations ==========

    /// Save an article record
    async fn save_article(&self, article: &Article) -> Result<()>;

    /// Get an article by ID
    async fn get_article(&self, id: &str) -> Result<Option<Article>>;

    // ========== Statistics ==========

    /// Get graph statistics
    async fn get_stats(&self) -> Result<GraphStats>;
}

/// Repository trait for article chunks used by vector retrieval
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Save (insert or overwrite) a chunk
    async fn save_chunk(&self, chunk: &ArticleChunk) -> Result<()>;

    /// List the chunks of an article in order
    async fn list_chunks(&self, article_id: &str) -> Result<Vec<ArticleChunk>>;

    /// Representative chunk of an article (lowest chunk index)
    async fn first_chunk(&self, article_id: &str) -> Result<Option<ChunkMatch>>;

    /// Cosine scan over chunk embeddings, best first
    ///
    /// Chunks whose embedding dimension differs from the query are skipped.
    async fn search_chunks(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ChunkMatch>>;
}

/// Direction for graph traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Follow outgoing edges (source -> target)
    Outgoing,
    /// Follow incoming edges (target -> source)
    Incoming,
    /// Follow edges in both directions
    Both,
}

/// Entity with distance from a starting point in graph traversal
#[derive(Debug, Clone)]
pub struct EntityWithDistance {
    /// The entity
    pub entity: Entity,
    /// Distance (number of hops) from the starting entity
    pub distance: u32,
    /// Path taken to reach this entity (entity IDs)
    pub path: Vec<String>,
}

/// Step in a path between entities
#[derive(Debug, Clone)]
pub struct PathStep {
    /// Entity at this step
    pub entity_id: String,
    /// Relationship used to reach this entity (None for starting entity)
    pub relationship: Option<PathRelationship>,
}

/// Relationship info in a path
#[derive(Debug, Clone)]
pub struct PathRelationship {
    pub relationship_id: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

/// Edge bookkeeping from a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeEdgeStats {
    /// Edges moved onto the survivor
    pub redirected: u64,
    /// Edges dropped because the survivor already had them or they became self-loops
    pub dropped: u64,
}

/// An entity embedding as stored
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub entity_id: String,
    /// Identifier of the backend that produced the vector
    pub backend: String,
    pub vector: Vec<f32>,
}

/// A chunk returned from document retrieval
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub article_id: String,
    pub article_title: String,
    pub chunk_index: u32,
    pub content: String,
    /// Cosine similarity for vector matches, 0.0 for lookups
    pub score: f32,
}

/// Statistics about the knowledge graph
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub total_entities: u64,
    pub total_relationships: u64,
    pub total_articles: u64,
    pub entities_by_type: Vec<(EntityType, u64)>,
    pub relationships_by_type: Vec<(RelationshipType, u64)>,
    /// Average strength across relationships
    pub average_strength: f64,
    pub entities_with_embeddings: u64,
    /// Number of distinct community labels
    pub communities: u64,
}
