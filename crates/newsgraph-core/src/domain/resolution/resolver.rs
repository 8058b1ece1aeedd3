//! Entity resolver
//!
//! Finds entities whose normalized names are near-identical and folds the
//! duplicates into one survivor. Duplicate finding is pairwise over a
//! single pass: A~B and B~C does not merge A with C unless a later pass
//! finds them similar.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ResolverSettings;
use crate::domain::knowledge::normalizer::{canonical_index, similarity};
use crate::domain::knowledge::{EntityType, GraphRepository, MergeEdgeStats};
use crate::error::{Error, Result};

/// Two entities judged to be the same thing
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePair {
    pub first_id: String,
    pub second_id: String,
    pub first_name: String,
    pub second_name: String,
    /// Sequence-matcher ratio of the normalized names
    pub similarity: f64,
}

/// Result of one successful merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub survivor_id: String,
    pub survivor_name: String,
    /// Id of the entity that was folded in and deleted
    pub merged_id: String,
    pub edges: MergeEdgeStats,
}

/// Counts from a full dedup pass
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub dry_run: bool,
    pub pairs: Vec<DuplicatePair>,
    pub merges: Vec<MergeOutcome>,
    /// Pairs whose entities were already merged away earlier in the pass
    pub skipped: usize,
    pub failed: usize,
}

impl MergeReport {
    pub fn merged(&self) -> usize {
        self.merges.len()
    }
}

/// Per-entity async locks
///
/// Merges lock both ids in sorted order so two merges touching the same
/// entity run one after the other.
#[derive(Default)]
pub struct EntityLockTable {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every id, in sorted order
    pub async fn lock_all(&self, ids: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut table = self.locks.lock().await;
            sorted
                .iter()
                .map(|id| table.entry(id.to_string()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }

    /// Drop the lock entry of an entity that no longer exists
    pub async fn forget(&self, id: &str) {
        self.locks.lock().await.remove(id);
    }

    /// Number of ids with a lock entry
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Entity deduplication service
pub struct EntityResolver<R: GraphRepository> {
    repository: Arc<R>,
    settings: ResolverSettings,
    locks: EntityLockTable,
}

impl<R: GraphRepository> EntityResolver<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            settings: ResolverSettings::default(),
            locks: EntityLockTable::new(),
        }
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// All unordered pairs of similar entities
    ///
    /// Without a type filter, entities of different types are compared too
    /// unless `same_type_only` is set.
    pub async fn find_duplicates(
        &self,
        type_filter: Option<EntityType>,
        threshold: f64,
    ) -> Result<Vec<DuplicatePair>> {
        let entities = self.repository.list_entities(type_filter).await?;
        let mut pairs = Vec::new();

        for (i, first) in entities.iter().enumerate() {
            if first.normalized_name.is_empty() {
                continue;
            }
            for second in &entities[i + 1..] {
                if second.normalized_name.is_empty() {
                    continue;
                }
                if self.settings.same_type_only && first.entity_type != second.entity_type {
                    continue;
                }

                let ratio = if first.normalized_name == second.normalized_name {
                    1.0
                } else {
                    similarity(&first.normalized_name, &second.normalized_name)
                };
                if ratio >= threshold {
                    pairs.push(DuplicatePair {
                        first_id: first.id.clone(),
                        second_id: second.id.clone(),
                        first_name: first.name.clone(),
                        second_name: second.name.clone(),
                        similarity: ratio,
                    });
                }
            }
        }

        debug!(
            entities = entities.len(),
            pairs = pairs.len(),
            threshold,
            "Duplicate scan finished"
        );
        Ok(pairs)
    }

    /// Merge two entities
    ///
    /// With `keep_canonical` the survivor is the entity whose name is
    /// preferred by the canonical-name chooser; otherwise `first_id`
    /// survives.
    pub async fn merge(
        &self,
        first_id: &str,
        second_id: &str,
        keep_canonical: bool,
    ) -> Result<MergeOutcome> {
        if first_id == second_id {
            return Err(Error::MergeConflict(format!(
                "cannot merge entity '{}' into itself",
                first_id
            )));
        }

        let _guards = self.locks.lock_all(&[first_id, second_id]).await;

        let first = self
            .repository
            .get_entity(first_id)
            .await?
            .ok_or_else(|| Error::EntityNotFound(first_id.to_string()))?;
        let second = self
            .repository
            .get_entity(second_id)
            .await?
            .ok_or_else(|| Error::EntityNotFound(second_id.to_string()))?;

        let (mut survivor, loser) = if keep_canonical {
            let candidates = [
                (first.name.as_str(), first.mention_count),
                (second.name.as_str(), second.mention_count),
            ];
            match canonical_index(&candidates) {
                Some(1) => (second, first),
                _ => (first, second),
            }
        } else {
            (first, second)
        };

        survivor.absorb(&loser);
        let edges = self.repository.merge_entities(&survivor, &loser.id).await?;
        self.locks.forget(&loser.id).await;

        info!(
            survivor = %survivor.name,
            merged = %loser.name,
            redirected = edges.redirected,
            dropped = edges.dropped,
            "Merged duplicate entity"
        );

        Ok(MergeOutcome {
            survivor_id: survivor.id,
            survivor_name: survivor.name,
            merged_id: loser.id,
            edges,
        })
    }

    /// Find and merge all duplicates in one pass
    ///
    /// Each pair is isolated: a failed merge is logged and counted and the
    /// pass continues. A dry run only discovers pairs.
    pub async fn merge_all_duplicates(
        &self,
        type_filter: Option<EntityType>,
        threshold: f64,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<MergeReport> {
        let pairs = self.find_duplicates(type_filter, threshold).await?;
        info!(pairs = pairs.len(), dry_run, "Starting dedup pass");

        let mut report = MergeReport {
            dry_run,
            ..Default::default()
        };

        if dry_run {
            report.pairs = pairs;
            return Ok(report);
        }

        let mut merged_away: HashSet<String> = HashSet::new();
        for pair in &pairs {
            if cancel.is_cancelled() {
                info!(merged = report.merged(), "Dedup pass cancelled");
                return Err(Error::Cancelled);
            }

            if merged_away.contains(&pair.first_id) || merged_away.contains(&pair.second_id) {
                debug!(
                    first = %pair.first_name,
                    second = %pair.second_name,
                    "Skipping pair, one side already merged"
                );
                report.skipped += 1;
                continue;
            }

            match self.merge(&pair.first_id, &pair.second_id, true).await {
                Ok(outcome) => {
                    merged_away.insert(outcome.merged_id.clone());
                    report.merges.push(outcome);
                }
                Err(e) => {
                    warn!(
                        first = %pair.first_name,
                        second = %pair.second_name,
                        error = %e,
                        "Failed to merge pair"
                    );
                    report.failed += 1;
                }
            }
        }
        report.pairs = pairs;

        info!(
            merged = report.merged(),
            skipped = report.skipped,
            failed = report.failed,
            "Dedup pass finished"
        );
        Ok(report)
    }

    /// Merge pass using the configured threshold
    pub async fn run(&self, dry_run: bool, cancel: &CancellationToken) -> Result<MergeReport> {
        self.merge_all_duplicates(None, self.settings.similarity_threshold, dry_run, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Entity, Relationship, RelationshipType};
    use crate::infrastructure::knowledge::SqliteGraphRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (Arc<SqliteGraphRepository>, EntityResolver<SqliteGraphRepository>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let repo = Arc::new(SqliteGraphRepository::new(pool));
        (repo.clone(), EntityResolver::new(repo))
    }

    async fn save(repo: &SqliteGraphRepository, entity: Entity) -> Entity {
        repo.save_entity(&entity).await.unwrap();
        entity
    }

    async fn assert_no_duplicate_edges(repo: &SqliteGraphRepository) {
        let edges = repo.list_relationships(None).await.unwrap();
        let mut keys: Vec<_> = edges.iter().map(|e| e.key()).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before, "duplicate (source, target, type) edge");
        assert!(edges.iter().all(|e| e.source_id != e.target_id));
    }

    #[tokio::test]
    async fn test_find_duplicates_is_pairwise() {
        let (repo, resolver) = setup().await;
        save(&repo, Entity::new("OpenAI", EntityType::Company)).await;
        save(&repo, Entity::new("Open AI", EntityType::Company)).await;
        save(&repo, Entity::new("Anthropic", EntityType::Company)).await;

        let pairs = resolver.find_duplicates(None, 0.85).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].similarity >= 0.85);

        let names = [pairs[0].first_name.as_str(), pairs[0].second_name.as_str()];
        assert!(names.contains(&"OpenAI"));
        assert!(names.contains(&"Open AI"));
    }

    #[tokio::test]
    async fn test_find_duplicates_across_types() {
        let (repo, resolver) = setup().await;
        save(&repo, Entity::new("Sequoia", EntityType::Investor)).await;
        save(&repo, Entity::new("Sequoia", EntityType::Company)).await;

        let pairs = resolver.find_duplicates(None, 0.85).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].similarity, 1.0);

        let strict = EntityResolver::new(repo.clone()).with_settings(ResolverSettings {
            same_type_only: true,
            ..Default::default()
        });
        assert!(strict.find_duplicates(None, 0.85).await.unwrap().is_empty());
        assert!(resolver
            .find_duplicates(Some(EntityType::Company), 0.85)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_merge_keeps_canonical_and_unions_state() {
        let (repo, resolver) = setup().await;
        let canonical = save(
            &repo,
            Entity::new("OpenAI", EntityType::Company)
                .with_mention_count(5)
                .with_description("AI lab")
                .with_source_article("a1"),
        )
        .await;
        let duplicate = save(
            &repo,
            Entity::new("Open AI", EntityType::Company)
                .with_mention_count(2)
                .with_description("Maker of ChatGPT")
                .with_source_article("a2"),
        )
        .await;

        // canonical wins regardless of argument order
        let outcome = resolver.merge(&duplicate.id, &canonical.id, true).await.unwrap();
        assert_eq!(outcome.survivor_id, canonical.id);
        assert_eq!(outcome.merged_id, duplicate.id);

        let survivor = repo.get_entity(&canonical.id).await.unwrap().unwrap();
        assert_eq!(survivor.mention_count, 7);
        assert_eq!(survivor.description, "AI lab | Maker of ChatGPT");
        assert_eq!(survivor.source_article_ids, vec!["a1", "a2"]);
        assert!(repo.get_entity(&duplicate.id).await.unwrap().is_none());
        assert_eq!(resolver.locks.tracked().await, 1);
    }

    #[tokio::test]
    async fn test_merge_without_canonical_keeps_first() {
        let (repo, resolver) = setup().await;
        let big = save(&repo, Entity::new("OpenAI", EntityType::Company).with_mention_count(9)).await;
        let small = save(&repo, Entity::new("Open AI", EntityType::Company)).await;

        let outcome = resolver.merge(&small.id, &big.id, false).await.unwrap();
        assert_eq!(outcome.survivor_id, small.id);
    }

    #[tokio::test]
    async fn test_merge_never_duplicates_edges() {
        let (repo, resolver) = setup().await;
        let a = save(&repo, Entity::new("OpenAI", EntityType::Company).with_mention_count(3)).await;
        let b = save(&repo, Entity::new("Open AI", EntityType::Company)).await;
        let msft = save(&repo, Entity::new("Microsoft", EntityType::Investor)).await;
        let google = save(&repo, Entity::new("Google", EntityType::Company)).await;

        for rel in [
            Relationship::new(&a.id, &msft.id, RelationshipType::FundedBy),
            Relationship::new(&b.id, &msft.id, RelationshipType::FundedBy),
            Relationship::new(&google.id, &a.id, RelationshipType::CompetesWith),
            Relationship::new(&google.id, &b.id, RelationshipType::CompetesWith),
            Relationship::new(&b.id, &a.id, RelationshipType::PartnersWith),
        ] {
            repo.save_relationship(&rel).await.unwrap();
        }

        let outcome = resolver.merge(&a.id, &b.id, true).await.unwrap();
        assert_eq!(outcome.edges.redirected, 0);
        assert_eq!(outcome.edges.dropped, 3);

        assert_no_duplicate_edges(&repo).await;
        assert_eq!(repo.count_relationships().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_merge_errors() {
        let (repo, resolver) = setup().await;
        let a = save(&repo, Entity::new("OpenAI", EntityType::Company)).await;

        assert!(matches!(
            resolver.merge(&a.id, &a.id, true).await,
            Err(Error::MergeConflict(_))
        ));
        assert!(matches!(
            resolver.merge(&a.id, "missing", true).await,
            Err(Error::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_all_skips_already_merged() {
        let (repo, resolver) = setup().await;
        save(&repo, Entity::new("Acme Robotics", EntityType::Company).with_mention_count(4)).await;
        save(&repo, Entity::new("Acme Robotic", EntityType::Company)).await;
        save(&repo, Entity::new("Acme Robotix", EntityType::Company)).await;

        let dry = resolver
            .merge_all_duplicates(None, 0.85, true, &CancellationToken::new())
            .await
            .unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.pairs.len(), 3);
        assert_eq!(dry.merged(), 0);
        assert_eq!(repo.count_entities().await.unwrap(), 3);

        let report = resolver
            .merge_all_duplicates(None, 0.85, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.merged() + report.skipped + report.failed, 3);
        assert_eq!(report.failed, 0);
        assert!(report.merged() >= 1);
        assert_eq!(
            repo.count_entities().await.unwrap() as usize,
            3 - report.merged()
        );
    }

    #[tokio::test]
    async fn test_merge_all_cancelled() {
        let (repo, resolver) = setup().await;
        save(&repo, Entity::new("OpenAI", EntityType::Company)).await;
        save(&repo, Entity::new("Open AI", EntityType::Company)).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resolver.merge_all_duplicates(None, 0.85, false, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(repo.count_entities().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_merges() {
        let (repo, resolver) = setup().await;
        let a = save(&repo, Entity::new("OpenAI", EntityType::Company).with_mention_count(5)).await;
        let b = save(&repo, Entity::new("Open AI", EntityType::Company)).await;
        let c = save(&repo, Entity::new("Open-AI", EntityType::Company)).await;
        let msft = save(&repo, Entity::new("Microsoft", EntityType::Investor)).await;
        for source in [&a, &b, &c] {
            repo.save_relationship(&Relationship::new(&source.id, &msft.id, RelationshipType::FundedBy))
                .await
                .unwrap();
        }

        let resolver = Arc::new(resolver);
        let (first, second) = tokio::join!(
            resolver.merge(&a.id, &b.id, true),
            resolver.merge(&b.id, &c.id, true)
        );
        assert!(first.is_ok() || second.is_ok());

        assert_no_duplicate_edges(&repo).await;
        let remaining = repo.count_entities().await.unwrap();
        let merges = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count() as u64;
        assert_eq!(remaining, 4 - merges);
    }
}
