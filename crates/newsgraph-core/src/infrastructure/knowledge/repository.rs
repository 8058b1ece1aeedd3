//! SQLite implementation of the GraphRepository
//!
//! Uses recursive CTEs for graph traversal and `UPDATE OR IGNORE` on the
//! relationship uniqueness key for merge redirects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::domain::knowledge::{
    Article, Entity, EntityType, EntityWithDistance, GraphRepository, GraphStats, MergeEdgeStats,
    PathRelationship, PathStep, Relationship, RelationshipKey, RelationshipType, StoredEmbedding,
    TraversalDirection,
};
use crate::error::{Error, Result};
use crate::infrastructure::embedding_blob::{decode_embedding, encode_embedding};

/// SQLite implementation of the graph repository
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    /// Create a new SQLite graph repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn write_entity(conn: &mut SqliteConnection, entity: &Entity) -> Result<()> {
    let source_article_ids_json = serde_json::to_string(&entity.source_article_ids)?;
    let enrichment_json = entity
        .enrichment
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO entities (
            id, entity_type, name, normalized_name, description, mention_count,
            source_article_ids, community_id, enrichment, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            normalized_name = excluded.normalized_name,
            description = excluded.description,
            mention_count = excluded.mention_count,
            source_article_ids = excluded.source_article_ids,
            community_id = excluded.community_id,
            enrichment = excluded.enrichment,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&entity.id)
    .bind(entity.entity_type.as_str())
    .bind(&entity.name)
    .bind(&entity.normalized_name)
    .bind(&entity.description)
    .bind(entity.mention_count as i64)
    .bind(&source_article_ids_json)
    .bind(entity.community_id)
    .bind(&enrichment_json)
    .bind(entity.created_at.to_rfc3339())
    .bind(entity.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Case-insensitive substring test that folds non-ASCII letters too
fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    // ========== Entity Operations ==========

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_entity(&mut *conn, entity).await?;

        debug!(entity_id = %entity.id, entity_name = %entity.name, "Entity saved");
        Ok(())
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as("SELECT * FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_entity()).transpose()
    }

    async fn get_entity_by_normalized_name(
        &self,
        normalized_name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = match entity_type {
            Some(t) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM entities
                    WHERE normalized_name = ? AND entity_type = ?
                    ORDER BY mention_count DESC
                    LIMIT 1
                    "#,
                )
                .bind(normalized_name)
                .bind(t.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM entities
                    WHERE normalized_name = ?
                    ORDER BY mention_count DESC
                    LIMIT 1
                    "#,
                )
                .bind(normalized_name)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|r| r.into_entity()).transpose()
    }

    async fn list_entities(&self, entity_type: Option<EntityType>) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = match entity_type {
            Some(t) => {
                sqlx::query_as(
                    "SELECT * FROM entities WHERE entity_type = ? ORDER BY mention_count DESC, name",
                )
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM entities ORDER BY mention_count DESC, name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(|r| r.into_entity()).collect()
    }

    async fn delete_entity(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM relationships WHERE source_id = ? OR target_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM entity_embeddings WHERE entity_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(entity_id = %id, "Entity deleted");
        }
        Ok(deleted)
    }

    async fn count_entities(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn search_entities(&self, query: &str, limit: usize) -> Result<Vec<Entity>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let needle = query.to_lowercase();

        // SQLite LIKE only folds ASCII case, so matching happens here
        let rows: Vec<EntityRow> =
            sqlx::query_as("SELECT * FROM entities ORDER BY mention_count DESC, name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .filter(|r| {
                contains_folded(&r.name, &needle) || contains_folded(&r.description, &needle)
            })
            .take(limit)
            .map(|r| r.into_entity())
            .collect()
    }

    // ========== Relationship Operations ==========

    async fn save_relationship(&self, relationship: &Relationship) -> Result<()> {
        relationship.validate()?;

        sqlx::query(
            r#"
            INSERT INTO relationships (
                id, source_id, target_id, relationship_type, description, strength,
                base_strength, observation_count, source_article_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, relationship_type) DO UPDATE SET
                description = excluded.description,
                strength = excluded.strength,
                base_strength = excluded.base_strength,
                observation_count = excluded.observation_count,
                source_article_id = excluded.source_article_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relationship.id)
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .bind(relationship.relationship_type.as_str())
        .bind(&relationship.description)
        .bind(relationship.strength)
        .bind(relationship.base_strength)
        .bind(relationship.observation_count.max(1) as i64)
        .bind(&relationship.source_article_id)
        .bind(relationship.created_at.to_rfc3339())
        .bind(relationship.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            relationship_id = %relationship.id,
            source = %relationship.source_id,
            target = %relationship.target_id,
            "Relationship saved"
        );
        Ok(())
    }

    async fn observe_relationship(&self, relationship: &Relationship) -> Result<Relationship> {
        relationship.validate()?;

        let row: RelationshipRow = sqlx::query_as(
            r#"
            INSERT INTO relationships (
                id, source_id, target_id, relationship_type, description, strength,
                base_strength, observation_count, source_article_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1, ?7, ?8, ?8)
            ON CONFLICT(source_id, target_id, relationship_type) DO UPDATE SET
                -- a new observation resets the edge to its extracted average
                -- until the next scoring pass
                base_strength = (relationships.base_strength + excluded.base_strength) / 2.0,
                strength = (relationships.base_strength + excluded.base_strength) / 2.0,
                description = CASE
                    WHEN excluded.description = '' THEN relationships.description
                    WHEN relationships.description = '' THEN excluded.description
                    WHEN instr(
                        ' | ' || relationships.description || ' | ',
                        ' | ' || excluded.description || ' | '
                    ) > 0 THEN relationships.description
                    ELSE relationships.description || ' | ' || excluded.description
                END,
                observation_count = relationships.observation_count + 1,
                source_article_id = COALESCE(relationships.source_article_id, excluded.source_article_id),
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&relationship.id)
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .bind(relationship.relationship_type.as_str())
        .bind(&relationship.description)
        .bind(relationship.base_strength)
        .bind(&relationship.source_article_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let stored = row.into_relationship()?;
        debug!(
            relationship_id = %stored.id,
            observations = stored.observation_count,
            strength = stored.strength,
            "Relationship observed"
        );
        Ok(stored)
    }

    async fn insert_relationship_if_absent(&self, relationship: &Relationship) -> Result<bool> {
        relationship.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO relationships (
                id, source_id, target_id, relationship_type, description, strength,
                base_strength, observation_count, source_article_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, relationship_type) DO NOTHING
            "#,
        )
        .bind(&relationship.id)
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .bind(relationship.relationship_type.as_str())
        .bind(&relationship.description)
        .bind(relationship.strength)
        .bind(relationship.base_strength)
        .bind(relationship.observation_count.max(1) as i64)
        .bind(&relationship.source_article_id)
        .bind(relationship.created_at.to_rfc3339())
        .bind(relationship.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>> {
        let row: Option<RelationshipRow> =
            sqlx::query_as("SELECT * FROM relationships WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_relationship()).transpose()
    }

    async fn get_relationship_between(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>> {
        let row: Option<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT * FROM relationships
            WHERE source_id = ? AND target_id = ? AND relationship_type = ?
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .bind(relationship_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_relationship()).transpose()
    }

    async fn list_relationships(
        &self,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = match relationship_type {
            Some(t) => {
                sqlx::query_as(
                    "SELECT * FROM relationships WHERE relationship_type = ? ORDER BY created_at, id",
                )
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM relationships ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn list_relationships_for_entity(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT * FROM relationships
            WHERE source_id = ? OR target_id = ?
            ORDER BY strength DESC
            "#,
        )
        .bind(entity_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn list_outgoing_relationships(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            "SELECT * FROM relationships WHERE source_id = ? ORDER BY strength DESC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn list_incoming_relationships(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            "SELECT * FROM relationships WHERE target_id = ? ORDER BY strength DESC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn count_observations(&self, key: &RelationshipKey) -> Result<u64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT observation_count FROM relationships
            WHERE source_id = ? AND target_id = ? AND relationship_type = ?
            "#,
        )
        .bind(&key.source_id)
        .bind(&key.target_id)
        .bind(key.relationship_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count,)| count.max(0) as u64).unwrap_or(0))
    }

    async fn set_relationship_strength(&self, id: &str, strength: f64) -> Result<bool> {
        crate::domain::knowledge::validate_strength(strength)?;

        let result = sqlx::query("UPDATE relationships SET strength = ?, updated_at = ? WHERE id = ?")
            .bind(strength)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM relationships WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(relationship_id = %id, "Relationship deleted");
        }
        Ok(deleted)
    }

    async fn count_relationships(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM relationships")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Merge Operations ==========

    async fn merge_entities(&self, survivor: &Entity, loser_id: &str) -> Result<MergeEdgeStats> {
        if survivor.id == loser_id {
            return Err(Error::MergeConflict(format!(
                "cannot merge entity '{}' into itself",
                loser_id
            )));
        }

        let mut tx = self.pool.begin().await?;

        let present: Vec<(String,)> = sqlx::query_as("SELECT id FROM entities WHERE id IN (?, ?)")
            .bind(&survivor.id)
            .bind(loser_id)
            .fetch_all(&mut *tx)
            .await?;
        for id in [survivor.id.as_str(), loser_id] {
            if !present.iter().any(|(found,)| found == id) {
                return Err(Error::MergeConflict(format!(
                    "entity '{}' no longer exists",
                    id
                )));
            }
        }

        write_entity(&mut *tx, survivor).await?;

        let now = Utc::now().to_rfc3339();
        // Redirects that collide with an existing survivor edge are skipped and deleted below
        let outgoing = sqlx::query(
            r#"
            UPDATE OR IGNORE relationships
            SET source_id = ?1, updated_at = ?3
            WHERE source_id = ?2 AND target_id != ?1
            "#,
        )
        .bind(&survivor.id)
        .bind(loser_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let incoming = sqlx::query(
            r#"
            UPDATE OR IGNORE relationships
            SET target_id = ?1, updated_at = ?3
            WHERE target_id = ?2 AND source_id != ?1
            "#,
        )
        .bind(&survivor.id)
        .bind(loser_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let dropped = sqlx::query("DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM entity_embeddings WHERE entity_id = ?")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let stats = MergeEdgeStats {
            redirected: outgoing.rows_affected() + incoming.rows_affected(),
            dropped: dropped.rows_affected(),
        };
        info!(
            survivor = %survivor.id,
            loser = %loser_id,
            redirected = stats.redirected,
            dropped = stats.dropped,
            "Entities merged"
        );
        Ok(stats)
    }

    // ========== Graph Traversal Operations ==========

    async fn get_neighborhood(
        &self,
        start_entity_id: &str,
        max_depth: u32,
        relationship_types: Option<&[RelationshipType]>,
    ) -> Result<Vec<EntityWithDistance>> {
        // Placeholders only; type names are bound below
        let type_filter = match relationship_types {
            Some(types) if !types.is_empty() => format!(
                "AND r.relationship_type IN ({})",
                types.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
            ),
            _ => String::new(),
        };

        let query = format!(
            r#"
            WITH RECURSIVE reachable(entity_id, depth, path) AS (
                SELECT ?, 0, ?

                UNION ALL

                SELECT
                    CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END,
                    prev.depth + 1,
                    prev.path || ',' || CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END
                FROM reachable prev
                JOIN relationships r ON (
                    r.source_id = prev.entity_id OR r.target_id = prev.entity_id
                )
                WHERE prev.depth < ?
                    AND ',' || prev.path || ',' NOT LIKE '%,' || CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END || ',%'
                    {}
            )
            SELECT
                e.*,
                MIN(r.depth) AS distance,
                (SELECT path FROM reachable WHERE entity_id = e.id ORDER BY depth LIMIT 1) AS path
            FROM entities e
            JOIN reachable r ON e.id = r.entity_id
            WHERE e.id != ?
            GROUP BY e.id
            ORDER BY distance, e.mention_count DESC
            "#,
            type_filter
        );

        let mut query_builder = sqlx::query_as::<_, NeighborhoodRow>(&query)
            .bind(start_entity_id)
            .bind(start_entity_id)
            .bind(max_depth as i64);

        if let Some(types) = relationship_types {
            for t in types {
                query_builder = query_builder.bind(t.as_str());
            }
        }

        query_builder = query_builder.bind(start_entity_id);

        let rows: Vec<NeighborhoodRow> = query_builder.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| {
                let path: Vec<String> = r
                    .path
                    .unwrap_or_default()
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();

                Ok(EntityWithDistance {
                    entity: r.entity.into_entity()?,
                    distance: r.distance.max(0) as u32,
                    path,
                })
            })
            .collect()
    }

    async fn find_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_depth: u32,
    ) -> Result<Option<Vec<PathStep>>> {
        let row: Option<PathRow> = sqlx::query_as(
            r#"
            WITH RECURSIVE path_finder(entity_id, depth, path, rel_path) AS (
                SELECT ?, 0, ?, ''

                UNION ALL

                SELECT
                    CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END,
                    prev.depth + 1,
                    prev.path || ',' || CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END,
                    prev.rel_path || CASE WHEN prev.rel_path = '' THEN '' ELSE ',' END
                        || r.id || ':' || r.relationship_type || ':' || r.strength
                FROM path_finder prev
                JOIN relationships r ON (
                    r.source_id = prev.entity_id OR r.target_id = prev.entity_id
                )
                WHERE prev.depth < ?
                    AND prev.entity_id != ?
                    AND ',' || prev.path || ',' NOT LIKE '%,' || CASE
                        WHEN r.source_id = prev.entity_id THEN r.target_id
                        ELSE r.source_id
                    END || ',%'
            )
            SELECT path, rel_path, depth
            FROM path_finder
            WHERE entity_id = ?
            ORDER BY depth
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .bind(source_id)
        .bind(max_depth as i64)
        .bind(target_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entity_ids: Vec<&str> = row.path.split(',').filter(|s| !s.is_empty()).collect();
        let rel_parts: Vec<&str> = row.rel_path.split(',').filter(|s| !s.is_empty()).collect();

        let steps = entity_ids
            .iter()
            .enumerate()
            .map(|(i, entity_id)| {
                let relationship = i
                    .checked_sub(1)
                    .and_then(|prev| rel_parts.get(prev))
                    .and_then(|part| parse_path_relationship(part));
                PathStep {
                    entity_id: entity_id.to_string(),
                    relationship,
                }
            })
            .collect();

        Ok(Some(steps))
    }

    async fn get_connected_entities(
        &self,
        entity_id: &str,
        relationship_type: RelationshipType,
        direction: TraversalDirection,
    ) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = match direction {
            TraversalDirection::Outgoing => {
                sqlx::query_as(
                    r#"
                    SELECT e.* FROM entities e
                    JOIN relationships r ON e.id = r.target_id
                    WHERE r.source_id = ? AND r.relationship_type = ?
                    ORDER BY r.strength DESC
                    "#,
                )
                .bind(entity_id)
                .bind(relationship_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            TraversalDirection::Incoming => {
                sqlx::query_as(
                    r#"
                    SELECT e.* FROM entities e
                    JOIN relationships r ON e.id = r.source_id
                    WHERE r.target_id = ? AND r.relationship_type = ?
                    ORDER BY r.strength DESC
                    "#,
                )
                .bind(entity_id)
                .bind(relationship_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            TraversalDirection::Both => {
                sqlx::query_as(
                    r#"
                    SELECT DISTINCT e.* FROM entities e
                    JOIN relationships r ON (
                        (e.id = r.target_id AND r.source_id = ?1)
                        OR (e.id = r.source_id AND r.target_id = ?1)
                    )
                    WHERE r.relationship_type = ?2
                    ORDER BY e.mention_count DESC
                    "#,
                )
                .bind(entity_id)
                .bind(relationship_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_entity()).collect()
    }

    // ========== Community Operations ==========

    async fn replace_community_assignments(&self, assignments: &[(String, i64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE entities SET community_id = NULL WHERE community_id IS NOT NULL")
            .execute(&mut *tx)
            .await?;

        for (entity_id, community_id) in assignments {
            sqlx::query("UPDATE entities SET community_id = ? WHERE id = ?")
                .bind(community_id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(assigned = assignments.len(), "Community assignments replaced");
        Ok(())
    }

    async fn list_entities_in_community(&self, community_id: i64) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            "SELECT * FROM entities WHERE community_id = ? ORDER BY mention_count DESC, name",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entity()).collect()
    }

    async fn list_communities(&self) -> Result<Vec<(i64, u64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT community_id, COUNT(*) FROM entities
            WHERE community_id IS NOT NULL
            GROUP BY community_id
            ORDER BY COUNT(*) DESC, community_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count as u64))
            .collect())
    }

    // ========== Entity Embedding Operations ==========

    async fn save_entity_embedding(
        &self,
        entity_id: &str,
        embedding: &[f32],
        backend: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_embeddings (entity_id, backend, dimensions, embedding, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(entity_id) DO UPDATE SET
                backend = excluded.backend,
                dimensions = excluded.dimensions,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_id)
        .bind(backend)
        .bind(embedding.len() as i64)
        .bind(encode_embedding(embedding))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(entity_id = %entity_id, backend = %backend, "Entity embedding saved");
        Ok(())
    }

    async fn get_entity_embedding(&self, entity_id: &str) -> Result<Option<StoredEmbedding>> {
        let row: Option<EmbeddingRow> = sqlx::query_as(
            "SELECT entity_id, backend, embedding FROM entity_embeddings WHERE entity_id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmbeddingRow::into_stored))
    }

    async fn list_entity_embeddings(&self) -> Result<Vec<StoredEmbedding>> {
        let rows: Vec<EmbeddingRow> =
            sqlx::query_as("SELECT entity_id, backend, embedding FROM entity_embeddings")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(EmbeddingRow::into_stored).collect())
    }

    // ========== Article Operations ==========

    async fn save_article(&self, article: &Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, url, title, published_date, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                published_date = excluded.published_date
            "#,
        )
        .bind(&article.id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.published_date)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row: Option<(String, String, String, Option<String>)> =
            sqlx::query_as("SELECT id, url, title, published_date FROM articles WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, url, title, published_date)| Article {
            id,
            url,
            title,
            published_date,
        }))
    }

    // ========== Statistics ==========

    async fn get_stats(&self) -> Result<GraphStats> {
        let (total_entities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;

        let (total_relationships,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM relationships")
            .fetch_one(&self.pool)
            .await?;

        let (total_articles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;

        let (avg_strength,): (Option<f64>,) =
            sqlx::query_as("SELECT AVG(strength) FROM relationships")
                .fetch_one(&self.pool)
                .await?;

        let (entities_with_embeddings,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entity_embeddings")
                .fetch_one(&self.pool)
                .await?;

        let (communities,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT community_id) FROM entities WHERE community_id IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let entities_by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let relationships_by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM relationships GROUP BY relationship_type ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(GraphStats {
            total_entities: total_entities as u64,
            total_relationships: total_relationships as u64,
            total_articles: total_articles as u64,
            entities_by_type: entities_by_type
                .into_iter()
                .filter_map(|(t, c)| EntityType::parse(&t).map(|et| (et, c as u64)))
                .collect(),
            relationships_by_type: relationships_by_type
                .into_iter()
                .filter_map(|(t, c)| RelationshipType::parse(&t).map(|rt| (rt, c as u64)))
                .collect(),
            average_strength: avg_strength.unwrap_or(0.0),
            entities_with_embeddings: entities_with_embeddings as u64,
            communities: communities as u64,
        })
    }
}

fn parse_path_relationship(part: &str) -> Option<PathRelationship> {
    let mut fields = part.splitn(3, ':');
    let relationship_id = fields.next()?.to_string();
    let relationship_type = RelationshipType::parse(fields.next()?)?;
    let strength = fields.next()?.parse().ok()?;
    Some(PathRelationship {
        relationship_id,
        relationship_type,
        strength,
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    entity_type: String,
    name: String,
    normalized_name: String,
    description: String,
    mention_count: i64,
    source_article_ids: String,
    community_id: Option<i64>,
    enrichment: Option<String>,
    created_at: String,
    updated_at: String,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| Error::InvalidRecord(format!("Invalid entity type: {}", self.entity_type)))?;

        let source_article_ids: Vec<String> = serde_json::from_str(&self.source_article_ids)?;
        let enrichment = self
            .enrichment
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Entity {
            id: self.id,
            name: self.name,
            entity_type,
            normalized_name: self.normalized_name,
            description: self.description,
            mention_count: self.mention_count.max(0) as u64,
            source_article_ids,
            community_id: self.community_id,
            enrichment,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    id: String,
    source_id: String,
    target_id: String,
    relationship_type: String,
    description: String,
    strength: f64,
    base_strength: f64,
    observation_count: i64,
    source_article_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<Relationship> {
        let relationship_type = self.relationship_type.parse::<RelationshipType>()?;

        Ok(Relationship {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type,
            description: self.description,
            strength: self.strength,
            base_strength: self.base_strength,
            observation_count: self.observation_count.max(1) as u64,
            source_article_id: self.source_article_id,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct NeighborhoodRow {
    #[sqlx(flatten)]
    entity: EntityRow,
    distance: i64,
    path: Option<String>,
}

#[derive(Debug, FromRow)]
struct PathRow {
    path: String,
    rel_path: String,
    #[allow(dead_code)]
    depth: i64,
}

#[derive(Debug, FromRow)]
struct EmbeddingRow {
    entity_id: String,
    backend: String,
    embedding: Vec<u8>,
}

impl EmbeddingRow {
    fn into_stored(self) -> StoredEmbedding {
        StoredEmbedding {
            entity_id: self.entity_id,
            backend: self.backend,
            vector: decode_embedding(&self.embedding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> SqliteGraphRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteGraphRepository::new(pool)
    }

    async fn company(repo: &SqliteGraphRepository, name: &str) -> Entity {
        let entity = Entity::new(name, EntityType::Company);
        repo.save_entity(&entity).await.unwrap();
        entity
    }

    async fn link(
        repo: &SqliteGraphRepository,
        source: &Entity,
        target: &Entity,
        relationship_type: RelationshipType,
    ) -> Relationship {
        let rel = Relationship::new(&source.id, &target.id, relationship_type);
        repo.save_relationship(&rel).await.unwrap();
        rel
    }

    #[tokio::test]
    async fn test_save_and_get_entity() {
        let repo = test_repo().await;

        let entity = Entity::new("Anthropic", EntityType::Company)
            .with_description("AI safety company")
            .with_source_article("art-1")
            .with_mention_count(3);
        repo.save_entity(&entity).await.unwrap();

        let retrieved = repo.get_entity(&entity.id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "Anthropic");
        assert_eq!(retrieved.entity_type, EntityType::Company);
        assert_eq!(retrieved.mention_count, 3);
        assert_eq!(retrieved.source_article_ids, vec!["art-1"]);

        let by_name = repo
            .get_entity_by_normalized_name("ANTHROPIC", Some(EntityType::Company))
            .await
            .unwrap();
        assert!(by_name.is_some());
        let wrong_type = repo
            .get_entity_by_normalized_name("ANTHROPIC", Some(EntityType::Person))
            .await
            .unwrap();
        assert!(wrong_type.is_none());
    }

    #[tokio::test]
    async fn test_enrichment_round_trips_through_json_column() {
        let repo = test_repo().await;

        let mut enrichment = crate::domain::knowledge::CompanyEnrichment::new().with_confidence(0.7);
        enrichment.founders = vec!["Jane Doe".into()];
        let entity = Entity::new("Acme Robotics", EntityType::Company).with_enrichment(enrichment);
        repo.save_entity(&entity).await.unwrap();

        let retrieved = repo.get_entity(&entity.id).await.unwrap().unwrap();
        let stored = retrieved.enrichment.unwrap();
        assert_eq!(stored.founders, vec!["Jane Doe"]);
    }

    #[tokio::test]
    async fn test_list_entities_by_type() {
        let repo = test_repo().await;
        company(&repo, "Stripe").await;
        repo.save_entity(&Entity::new("Patrick Collison", EntityType::Person))
            .await
            .unwrap();

        assert_eq!(repo.list_entities(None).await.unwrap().len(), 2);
        let people = repo.list_entities(Some(EntityType::Person)).await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Patrick Collison");
        assert_eq!(repo.count_entities().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_entities_is_case_insensitive_substring() {
        let repo = test_repo().await;
        let e1 = Entity::new("DeepMind", EntityType::Company).with_description("AI research lab");
        let e2 = Entity::new("Stripe", EntityType::Company).with_description("Payments");
        repo.save_entity(&e1).await.unwrap();
        repo.save_entity(&e2).await.unwrap();

        let results = repo.search_entities("deepmind", 10).await.unwrap();
        assert_eq!(results.len(), 1);

        let results = repo.search_entities("research", 10).await.unwrap();
        assert_eq!(results[0].name, "DeepMind");

        // wildcard characters match literally
        assert!(repo.search_entities("%", 10).await.unwrap().is_empty());
        assert!(repo.search_entities("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_entities_folds_non_ascii_case() {
        let repo = test_repo().await;
        let e1 = Entity::new("Müller Robotics", EntityType::Company)
            .with_description("Industrielle Roboter aus München");
        let e2 = Entity::new("Ørsted", EntityType::Company).with_mention_count(3);
        repo.save_entity(&e1).await.unwrap();
        repo.save_entity(&e2).await.unwrap();

        let results = repo.search_entities("MÜLLER", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Müller Robotics");

        let results = repo.search_entities("MÜNCHEN", 10).await.unwrap();
        assert_eq!(results[0].name, "Müller Robotics");

        let results = repo.search_entities("ørsted", 10).await.unwrap();
        assert_eq!(results[0].name, "Ørsted");

        // limit applies after matching
        let results = repo.search_entities("r", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ørsted");
    }

    #[tokio::test]
    async fn test_observe_relationship_averages_and_concatenates() {
        let repo = test_repo().await;
        let a = company(&repo, "Anthropic").await;
        let b = company(&repo, "Google").await;

        let first = Relationship::new(&a.id, &b.id, RelationshipType::FundedBy)
            .with_strength(8.0)
            .with_description("Invested $300M");
        let stored = repo.observe_relationship(&first).await.unwrap();
        assert_eq!(stored.observation_count, 1);
        assert_eq!(stored.strength, 8.0);

        let second = Relationship::new(&a.id, &b.id, RelationshipType::FundedBy)
            .with_strength(4.0)
            .with_description("Added $2B");
        let stored = repo.observe_relationship(&second).await.unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.observation_count, 2);
        assert!((stored.strength - 6.0).abs() < 1e-9);
        assert_eq!(stored.description, "Invested $300M | Added $2B");

        // repeating a description does not duplicate it
        let stored = repo.observe_relationship(&second).await.unwrap();
        assert_eq!(stored.description, "Invested $300M | Added $2B");
        assert_eq!(repo.count_relationships().await.unwrap(), 1);
        assert_eq!(repo.count_observations(&first.key()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_insert_relationship_if_absent() {
        let repo = test_repo().await;
        let a = company(&repo, "A Corp Holdings").await;
        let b = company(&repo, "B Labs").await;

        let rel = Relationship::new(&a.id, &b.id, RelationshipType::PartnersWith);
        assert!(repo.insert_relationship_if_absent(&rel).await.unwrap());

        let duplicate = Relationship::new(&a.id, &b.id, RelationshipType::PartnersWith);
        assert!(!repo.insert_relationship_if_absent(&duplicate).await.unwrap());
        assert_eq!(repo.count_relationships().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_relationship_strength_validates_range() {
        let repo = test_repo().await;
        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let rel = link(&repo, &a, &b, RelationshipType::CompetesWith).await;

        assert!(repo.set_relationship_strength(&rel.id, 7.5).await.unwrap());
        let stored = repo.get_relationship(&rel.id).await.unwrap().unwrap();
        assert_eq!(stored.strength, 7.5);

        assert!(matches!(
            repo.set_relationship_strength(&rel.id, 10.5).await,
            Err(Error::StrengthOutOfRange(_))
        ));
        assert!(!repo.set_relationship_strength("missing", 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_outgoing_incoming_relationships() {
        let repo = test_repo().await;
        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let c = company(&repo, "Gamma").await;
        link(&repo, &a, &b, RelationshipType::PartnersWith).await;
        link(&repo, &c, &a, RelationshipType::Acquired).await;

        assert_eq!(repo.list_outgoing_relationships(&a.id).await.unwrap().len(), 1);
        assert_eq!(repo.list_incoming_relationships(&a.id).await.unwrap().len(), 1);
        assert_eq!(repo.list_relationships_for_entity(&a.id).await.unwrap().len(), 2);
        assert_eq!(
            repo.list_relationships(Some(RelationshipType::Acquired))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_merge_redirects_without_duplicates() {
        let repo = test_repo().await;
        let survivor = company(&repo, "OpenAI").await;
        let loser = company(&repo, "Open AI Labs").await;
        let investor = company(&repo, "Microsoft").await;
        let partner = company(&repo, "Apple").await;
        let rival = company(&repo, "Anthropic").await;

        // both have FUNDED_BY Microsoft: the loser's copy must be dropped
        link(&repo, &survivor, &investor, RelationshipType::FundedBy).await;
        link(&repo, &loser, &investor, RelationshipType::FundedBy).await;
        // only the loser partners with Apple: must be redirected
        link(&repo, &loser, &partner, RelationshipType::PartnersWith).await;
        // incoming edge to the loser: must be redirected
        link(&repo, &rival, &loser, RelationshipType::CompetesWith).await;
        // edge between the two: would become a self-loop
        link(&repo, &loser, &survivor, RelationshipType::CompetesWith).await;

        let stats = repo.merge_entities(&survivor, &loser.id).await.unwrap();
        assert_eq!(stats.redirected, 2);
        assert_eq!(stats.dropped, 2);

        assert!(repo.get_entity(&loser.id).await.unwrap().is_none());

        let edges = repo.list_relationships(None).await.unwrap();
        assert_eq!(edges.len(), 3);
        let mut keys: Vec<_> = edges.iter().map(|e| e.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);
        assert!(edges.iter().all(|e| e.source_id != e.target_id));
        assert!(edges
            .iter()
            .all(|e| e.source_id != loser.id && e.target_id != loser.id));
    }

    #[tokio::test]
    async fn test_merge_missing_entity_is_conflict() {
        let repo = test_repo().await;
        let survivor = company(&repo, "OpenAI").await;

        let result = repo.merge_entities(&survivor, "does-not-exist").await;
        assert!(matches!(result, Err(Error::MergeConflict(_))));

        let result = repo.merge_entities(&survivor, &survivor.id).await;
        assert!(matches!(result, Err(Error::MergeConflict(_))));
    }

    #[tokio::test]
    async fn test_get_neighborhood() {
        let repo = test_repo().await;

        // A -> B -> C
        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let c = company(&repo, "Gamma").await;
        link(&repo, &a, &b, RelationshipType::PartnersWith).await;
        link(&repo, &b, &c, RelationshipType::AnnouncedAt).await;

        let neighbors = repo.get_neighborhood(&a.id, 1, None).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].entity.name, "Beta");
        assert_eq!(neighbors[0].distance, 1);

        let neighbors = repo.get_neighborhood(&a.id, 2, None).await.unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[1].path, vec![a.id.clone(), b.id.clone(), c.id.clone()]);

        // Traversal follows edges in both directions
        let neighbors = repo.get_neighborhood(&c.id, 2, None).await.unwrap();
        assert_eq!(neighbors.len(), 2);

        let structural = RelationshipType::structural();
        let neighbors = repo
            .get_neighborhood(&a.id, 2, Some(&structural))
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 1);
    }

    #[tokio::test]
    async fn test_find_path() {
        let repo = test_repo().await;

        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let c = company(&repo, "Gamma").await;
        let d = company(&repo, "Delta").await;
        link(&repo, &a, &b, RelationshipType::PartnersWith).await;
        link(&repo, &c, &b, RelationshipType::FundedBy).await;

        let path = repo.find_path(&a.id, &c.id, 3).await.unwrap().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].entity_id, a.id);
        assert!(path[0].relationship.is_none());
        assert_eq!(path[2].entity_id, c.id);
        assert_eq!(
            path[2].relationship.as_ref().unwrap().relationship_type,
            RelationshipType::FundedBy
        );

        assert!(repo.find_path(&a.id, &d.id, 3).await.unwrap().is_none());
        assert!(repo.find_path(&a.id, &c.id, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_connected_entities() {
        let repo = test_repo().await;
        let startup = company(&repo, "Startup").await;
        let vc = Entity::new("Sequoia Capital", EntityType::Investor);
        repo.save_entity(&vc).await.unwrap();
        link(&repo, &startup, &vc, RelationshipType::FundedBy).await;

        let investors = repo
            .get_connected_entities(&startup.id, RelationshipType::FundedBy, TraversalDirection::Outgoing)
            .await
            .unwrap();
        assert_eq!(investors.len(), 1);
        assert_eq!(investors[0].name, "Sequoia Capital");

        let portfolio = repo
            .get_connected_entities(&vc.id, RelationshipType::FundedBy, TraversalDirection::Incoming)
            .await
            .unwrap();
        assert_eq!(portfolio[0].id, startup.id);

        let both = repo
            .get_connected_entities(&vc.id, RelationshipType::FundedBy, TraversalDirection::Both)
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_community_assignments() {
        let repo = test_repo().await;
        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let c = company(&repo, "Gamma").await;

        repo.replace_community_assignments(&[(a.id.clone(), 0), (b.id.clone(), 0), (c.id.clone(), 1)])
            .await
            .unwrap();
        assert_eq!(repo.list_entities_in_community(0).await.unwrap().len(), 2);
        assert_eq!(repo.list_communities().await.unwrap(), vec![(0, 2), (1, 1)]);

        // Full overwrite: c loses its label
        repo.replace_community_assignments(&[(a.id.clone(), 5)])
            .await
            .unwrap();
        assert_eq!(repo.list_communities().await.unwrap(), vec![(5, 1)]);
        let c = repo.get_entity(&c.id).await.unwrap().unwrap();
        assert_eq!(c.community_id, None);
    }

    #[tokio::test]
    async fn test_entity_embeddings() {
        let repo = test_repo().await;
        let entity = company(&repo, "Embedded").await;

        repo.save_entity_embedding(&entity.id, &[0.1, 0.2, 0.3], "test-model")
            .await
            .unwrap();
        repo.save_entity_embedding(&entity.id, &[0.5, 0.5], "other-model")
            .await
            .unwrap();

        let stored = repo.get_entity_embedding(&entity.id).await.unwrap().unwrap();
        assert_eq!(stored.backend, "other-model");
        assert_eq!(stored.vector.len(), 2);
        assert_eq!(repo.list_entity_embeddings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_articles_and_stats() {
        let repo = test_repo().await;
        let article = Article::new("art-1", "Anthropic raises Series C")
            .with_url("https://example.com/a")
            .with_published_date("2024-05-01");
        repo.save_article(&article).await.unwrap();
        assert_eq!(repo.get_article("art-1").await.unwrap(), Some(article));
        assert!(repo.get_article("missing").await.unwrap().is_none());

        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        let rel = Relationship::new(&a.id, &b.id, RelationshipType::Acquired).with_strength(8.0);
        repo.save_relationship(&rel).await.unwrap();
        repo.save_entity_embedding(&a.id, &[1.0], "m").await.unwrap();

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.total_relationships, 1);
        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.entities_with_embeddings, 1);
        assert!((stats.average_strength - 8.0).abs() < 1e-9);
        assert_eq!(stats.entities_by_type, vec![(EntityType::Company, 2)]);
    }

    #[tokio::test]
    async fn test_delete_entity_removes_edges() {
        let repo = test_repo().await;
        let a = company(&repo, "Alpha").await;
        let b = company(&repo, "Beta").await;
        link(&repo, &a, &b, RelationshipType::PartnersWith).await;

        assert!(repo.delete_entity(&a.id).await.unwrap());
        assert_eq!(repo.count_relationships().await.unwrap(), 0);
        assert!(!repo.delete_entity(&a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_pool_reports_store_unavailable() {
        let repo = test_repo().await;
        repo.pool.close().await;

        let err = repo.get_entity("anything").await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}
