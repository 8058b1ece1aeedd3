//! Tiered community detection
//!
//! Tiers are tried in order and any failure falls through to the next one.
//! When every configured tier fails the detector ends with connected
//! components found by bounded BFS against the store, which cannot fail:
//! a node whose neighbourhood query errors simply forms its own component.
//!
//! Assignment is a full overwrite of every entity's `community_id`.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::local::LocalCommunityAlgorithms;
use super::projection::GraphProjection;
use crate::config::CommunitySettings;
use crate::domain::knowledge::normalizer::normalize;
use crate::domain::knowledge::{Entity, EntityType, GraphRepository, RelationshipType};
use crate::error::{Error, Result};

/// Groups of entity ids produced by one algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Name of the algorithm that produced the grouping, e.g. `local:leiden`
    pub algorithm: String,
    pub groups: Vec<Vec<String>>,
}

/// A fallible community detection tier
#[async_trait]
pub trait CommunityAlgorithm: Send + Sync {
    /// Tier name for logs
    fn name(&self) -> &str;

    /// Partition the projection into groups of entity ids
    async fn detect(&self, projection: &GraphProjection) -> Result<Detection>;
}

/// Connected components via repeated bounded neighbourhood queries
pub struct BfsComponents<R: GraphRepository> {
    repository: Arc<R>,
    max_depth: u32,
}

impl<R: GraphRepository> BfsComponents<R> {
    pub fn new(repository: Arc<R>, max_depth: u32) -> Self {
        Self {
            repository,
            max_depth: max_depth.max(1),
        }
    }

    /// Components over the given entity ids
    pub async fn components(&self, entity_ids: &[String]) -> Detection {
        let structural = RelationshipType::structural();
        let known: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut groups = Vec::new();
        let mut failed_queries = 0usize;

        for start in entity_ids {
            if !visited.insert(start.clone()) {
                continue;
            }

            let mut component = vec![start.clone()];
            let mut queue = VecDeque::from([start.clone()]);

            while let Some(current) = queue.pop_front() {
                let neighborhood = match self
                    .repository
                    .get_neighborhood(&current, self.max_depth, Some(&structural))
                    .await
                {
                    Ok(neighborhood) => neighborhood,
                    Err(e) => {
                        debug!(entity_id = %current, error = %e, "Neighbourhood query failed during BFS");
                        failed_queries += 1;
                        continue;
                    }
                };

                for neighbor in neighborhood {
                    let id = neighbor.entity.id;
                    if known.contains(id.as_str()) && visited.insert(id.clone()) {
                        component.push(id.clone());
                        queue.push_back(id);
                    }
                }
            }

            groups.push(component);
        }

        if failed_queries > 0 {
            warn!(failed_queries, "Some BFS neighbourhood queries failed");
        }

        Detection {
            algorithm: "bfs_components".to_string(),
            groups,
        }
    }
}

/// Outcome of a detection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityReport {
    /// Algorithm that produced the kept grouping
    pub algorithm: String,
    /// Tiers that failed before it, by name
    pub failed_tiers: Vec<String>,
    pub communities: usize,
    pub assigned_entities: usize,
    /// Groups dropped for being below the minimum size
    pub discarded_groups: usize,
}

/// Read-only view of one community
#[derive(Debug, Clone)]
pub struct CommunitySummary {
    pub community_id: i64,
    pub size: usize,
    pub members: Vec<Entity>,
    pub type_breakdown: BTreeMap<EntityType, usize>,
    /// Edges with both ends inside the community
    pub internal_edges: usize,
    /// Members ranked by internal degree, highest first
    pub top_entities: Vec<(String, usize)>,
}

/// A community adjacent to an entity
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedCommunity {
    pub community_id: i64,
    /// Edges between the entity and this community
    pub connections: usize,
    pub size: u64,
}

/// Community detection service
pub struct CommunityDetector<R: GraphRepository> {
    repository: Arc<R>,
    tiers: Vec<Arc<dyn CommunityAlgorithm>>,
    fallback: BfsComponents<R>,
    min_community_size: usize,
}

impl<R: GraphRepository> CommunityDetector<R> {
    /// Detector with only the BFS fallback
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_settings(repository, &CommunitySettings::default())
    }

    /// Detector with the local tier when enabled in settings
    ///
    /// The remote analytics tier lives in the infrastructure layer and is
    /// added in front with [`CommunityDetector::with_tier`].
    pub fn with_settings(repository: Arc<R>, settings: &CommunitySettings) -> Self {
        let mut tiers: Vec<Arc<dyn CommunityAlgorithm>> = Vec::new();
        if settings.local_algorithms {
            tiers.push(Arc::new(LocalCommunityAlgorithms::new(settings.seed)));
        }

        Self {
            fallback: BfsComponents::new(repository.clone(), settings.bfs_max_depth),
            repository,
            tiers,
            min_community_size: settings.min_community_size.max(1),
        }
    }

    /// Put a tier in front of the existing ones
    pub fn with_tier(mut self, tier: Arc<dyn CommunityAlgorithm>) -> Self {
        self.tiers.insert(0, tier);
        self
    }

    /// Drop all fallible tiers
    pub fn bfs_only(mut self) -> Self {
        self.tiers.clear();
        self
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn min_community_size(&self) -> usize {
        self.min_community_size
    }

    /// Run the tier chain and overwrite every community assignment
    pub async fn detect_communities(&self, cancel: &CancellationToken) -> Result<CommunityReport> {
        let projection = GraphProjection::load(self.repository.as_ref()).await?;
        info!(
            nodes = projection.node_count(),
            edges = projection.edge_count(),
            tiers = self.tiers.len(),
            "Detecting communities"
        );

        let mut failed_tiers = Vec::new();
        let mut detection = None;
        for tier in &self.tiers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match tier.detect(&projection).await {
                Ok(found) => {
                    detection = Some(found);
                    break;
                }
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Community tier failed, falling through");
                    failed_tiers.push(tier.name().to_string());
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let detection = match detection {
            Some(detection) => detection,
            None => self.fallback.components(projection.nodes()).await,
        };

        let (assignments, communities, discarded_groups) =
            assign(detection.groups, self.min_community_size);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.repository
            .replace_community_assignments(&assignments)
            .await?;

        let report = CommunityReport {
            algorithm: detection.algorithm,
            failed_tiers,
            communities,
            assigned_entities: assignments.len(),
            discarded_groups,
        };
        info!(
            algorithm = %report.algorithm,
            communities = report.communities,
            assigned = report.assigned_entities,
            discarded = report.discarded_groups,
            "Communities detected"
        );
        Ok(report)
    }

    /// `(community_id, size)` for every community, largest first
    pub async fn list_communities(&self) -> Result<Vec<(i64, u64)>> {
        self.repository.list_communities().await
    }

    /// Members, composition and internal structure of one community
    pub async fn get_community_summary(&self, community_id: i64) -> Result<CommunitySummary> {
        let members = self
            .repository
            .list_entities_in_community(community_id)
            .await?;
        if members.is_empty() {
            return Err(Error::CommunityNotFound(community_id));
        }

        let member_ids: HashSet<&str> = members.iter().map(|e| e.id.as_str()).collect();
        let mut type_breakdown: BTreeMap<EntityType, usize> = BTreeMap::new();
        let mut degree: HashMap<&str, usize> = HashMap::new();
        let mut internal_edges = 0;

        for member in &members {
            *type_breakdown.entry(member.entity_type).or_default() += 1;
            for edge in self
                .repository
                .list_outgoing_relationships(&member.id)
                .await?
            {
                if let Some(&target) = member_ids.get(edge.target_id.as_str()) {
                    internal_edges += 1;
                    *degree.entry(member.id.as_str()).or_default() += 1;
                    *degree.entry(target).or_default() += 1;
                }
            }
        }

        let mut top_entities: Vec<(String, usize)> = members
            .iter()
            .map(|m| (m.name.clone(), degree.get(m.id.as_str()).copied().unwrap_or(0)))
            .collect();
        top_entities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_entities.truncate(5);

        Ok(CommunitySummary {
            community_id,
            size: members.len(),
            type_breakdown,
            internal_edges,
            top_entities,
            members,
        })
    }

    /// Communities other than the entity's own that its edges reach
    pub async fn find_related_communities(&self, entity_name: &str) -> Result<Vec<RelatedCommunity>> {
        let entity = self
            .repository
            .get_entity_by_normalized_name(&normalize(entity_name), None)
            .await?
            .ok_or_else(|| Error::EntityNotFound(entity_name.to_string()))?;

        let mut connections: BTreeMap<i64, usize> = BTreeMap::new();
        for edge in self
            .repository
            .list_relationships_for_entity(&entity.id)
            .await?
        {
            let other_id = if edge.source_id == entity.id {
                &edge.target_id
            } else {
                &edge.source_id
            };
            let Some(other) = self.repository.get_entity(other_id).await? else {
                continue;
            };
            match other.community_id {
                Some(id) if Some(id) != entity.community_id => {
                    *connections.entry(id).or_default() += 1;
                }
                _ => {}
            }
        }

        let sizes: HashMap<i64, u64> = self.repository.list_communities().await?.into_iter().collect();
        let mut related: Vec<RelatedCommunity> = connections
            .into_iter()
            .map(|(community_id, connections)| RelatedCommunity {
                community_id,
                connections,
                size: sizes.get(&community_id).copied().unwrap_or(0),
            })
            .collect();
        related.sort_by(|a, b| b.connections.cmp(&a.connections).then(a.community_id.cmp(&b.community_id)));
        Ok(related)
    }
}

/// Filter groups by size and number them largest first
///
/// Returns the assignments, the number of communities kept and the number
/// of groups discarded.
fn assign(groups: Vec<Vec<String>>, min_size: usize) -> (Vec<(String, i64)>, usize, usize) {
    let total = groups.len();
    let mut kept: Vec<Vec<String>> = groups
        .into_iter()
        .filter(|g| g.len() >= min_size)
        .map(|mut g| {
            g.sort();
            g
        })
        .collect();
    kept.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));

    let communities = kept.len();
    let assignments = kept
        .into_iter()
        .enumerate()
        .flat_map(|(id, members)| members.into_iter().map(move |m| (m, id as i64)))
        .collect();
    (assignments, communities, total - communities)
}
