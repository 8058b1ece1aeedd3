//! Hybrid retrieval engine
//!
//! Answers a question in one of two modes. In hybrid mode the question is
//! classified, routed and answered from the graph: profiles, sector listings,
//! multi-hop context or hybrid entity search with fused documents. When the
//! graph store is unreachable the engine drops to vector-only mode and serves
//! document chunks alone.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::context::{expand_graph_context, GraphContext, RelationshipTriple};
use super::fusion::{fuse_documents, FusedDocument, GraphDocument};
use super::intent::{classify, extract_names, Classification, QueryFilters};
use super::router::{route, GraphProfile, Route};
use super::search::{merge_hybrid, HybridHit};
use crate::config::RetrievalSettings;
use crate::domain::embedding::{EmbeddingClient, EmbeddingService, SimilarEntity};
use crate::domain::knowledge::normalizer::normalize;
use crate::domain::knowledge::{
    ChunkMatch, DocumentRepository, Entity, EntityType, GraphRepository, GraphStats,
    RelationshipType,
};
use crate::error::{Error, ErrorCategory, Result};

/// Look-back window for "recent" filters
pub const RECENT_WINDOW_DAYS: i64 = 90;
/// Cap on companies in a sector listing
pub const MAX_LISTED_COMPANIES: usize = 100;
/// Cap on seed entities for multi-hop questions
pub const MAX_SEEDS: usize = 5;

const INSIGHT_TRIPLES: usize = 10;
const INSIGHT_COMMUNITIES: usize = 5;
const COMMUNITY_PREVIEW: usize = 5;

/// How a response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Hybrid,
    /// Graph store unavailable; documents only
    VectorOnly,
}

/// An entity used as a starting point, with how well it matched
#[derive(Debug, Clone)]
pub struct SeedEntity {
    pub entity: Entity,
    /// Hit score capped at 1.0; named entities count as 1.0
    pub similarity: f64,
}

impl From<&HybridHit> for SeedEntity {
    fn from(hit: &HybridHit) -> Self {
        Self {
            entity: hit.entity.clone(),
            similarity: hit.score.min(1.0),
        }
    }
}

/// Entities related to a profile subject under one label
#[derive(Debug, Clone)]
pub struct ProfileGroup {
    pub label: &'static str,
    pub entities: Vec<Entity>,
}

/// One-read profile of a single entity
#[derive(Debug, Clone)]
pub struct EntityProfile {
    pub entity: Entity,
    pub profile: GraphProfile,
    /// Non-empty groups in template order
    pub groups: Vec<ProfileGroup>,
}

impl EntityProfile {
    pub fn group(&self, label: &str) -> Option<&ProfileGroup> {
        self.groups.iter().find(|g| g.label == label)
    }

    /// Names in a group, empty when the group is absent
    pub fn names(&self, label: &str) -> Vec<&str> {
        self.group(label)
            .map(|g| g.entities.iter().map(|e| e.name.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A company in a sector listing
#[derive(Debug, Clone)]
pub struct ListedCompany {
    pub entity: Entity,
    pub investors: Vec<String>,
}

/// Companies matching sector and recency filters
#[derive(Debug, Clone)]
pub struct SectorListing {
    pub filters: QueryFilters,
    pub funded_only: bool,
    pub companies: Vec<ListedCompany>,
}

/// One node on a connecting path
#[derive(Debug, Clone)]
pub struct ConnectingStep {
    pub entity_id: String,
    pub entity_name: String,
    /// Edge walked to reach this node; `None` on the first step
    pub relationship_type: Option<RelationshipType>,
    pub strength: Option<f64>,
}

/// Shortest undirected path between two entities
#[derive(Debug, Clone)]
pub struct ConnectingPath {
    pub steps: Vec<ConnectingStep>,
}

impl ConnectingPath {
    pub fn hops(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// `A -[TYPE]- B -[TYPE]- C`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            if let Some(relationship_type) = step.relationship_type {
                out.push_str(&format!(" -[{}]- ", relationship_type));
            }
            out.push_str(&step.entity_name);
        }
        out
    }
}

/// Hybrid search with its graph context and fused documents
#[derive(Debug, Clone, Default)]
pub struct SearchPayload {
    pub hits: Vec<HybridHit>,
    pub context: GraphContext,
    pub documents: Vec<FusedDocument>,
}

/// Seeds, their neighbourhood and how the first two connect
#[derive(Debug, Clone)]
pub struct MultiHopResult {
    pub seeds: Vec<SeedEntity>,
    pub context: GraphContext,
    pub path: Option<ConnectingPath>,
    pub documents: Vec<FusedDocument>,
}

/// Side-by-side view of two entities
#[derive(Debug, Clone)]
pub struct Comparison {
    pub left: EntityProfile,
    pub right: EntityProfile,
    /// Direct neighbours of both
    pub shared_neighbors: Vec<Entity>,
    pub path: Option<ConnectingPath>,
    pub context: GraphContext,
}

/// Largest communities with a few of their best-known members
#[derive(Debug, Clone)]
pub struct CommunityOverview {
    pub community_id: i64,
    pub size: u64,
    pub top_members: Vec<String>,
}

/// Graph-wide or topic-focused overview
#[derive(Debug, Clone)]
pub struct GraphInsights {
    pub topic: Option<String>,
    pub stats: GraphStats,
    pub communities: Vec<CommunityOverview>,
    /// Strongest relationships, overall or around the topic
    pub strongest: Vec<RelationshipTriple>,
}

/// The structured result handed to answer synthesis
#[derive(Debug, Clone)]
pub enum QueryPayload {
    Profile(EntityProfile),
    SectorListing(SectorListing),
    Insights(GraphInsights),
    MultiHop(MultiHopResult),
    Search(SearchPayload),
    /// Vector-only fallback
    Documents(Vec<FusedDocument>),
}

/// A classified, routed and answered question
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub question: String,
    pub classification: Classification,
    pub route: Route,
    pub mode: RetrievalMode,
    pub payload: QueryPayload,
}

fn is_embedding_outage(error: &Error) -> bool {
    error.category() == ErrorCategory::EmbeddingUnavailable
}

/// Canonical sector name to extra terms that imply it
fn sector_aliases(sector: &str) -> &'static [&'static str] {
    match sector {
        "ai" => &["artificial intelligence", "machine learning", "llm", "generative"],
        "ml" => &["machine learning"],
        "crypto" => &["cryptocurrency", "blockchain", "web3"],
        "blockchain" => &["crypto", "web3"],
        "fintech" => &["payments", "banking"],
        "healthcare" => &["health", "medical"],
        "biotech" => &["biotechnology", "drug discovery"],
        "saas" => &["software as a service"],
        _ => &[],
    }
}

/// Lowercase, alphanumeric words joined and padded with single spaces
fn word_text(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

/// Whether an entity's name, description or enrichment mentions the sector
fn mentions_sector(entity: &Entity, sector: &str) -> bool {
    let mut text = format!("{} {}", entity.name, entity.description);
    if let Some(enrichment) = &entity.enrichment {
        text.push(' ');
        text.push_str(&enrichment.summary());
    }
    let text = word_text(&text);
    std::iter::once(sector)
        .chain(sector_aliases(sector).iter().copied())
        .any(|term| text.contains(&format!(" {} ", term)))
}

/// Hybrid retrieval over the graph and document stores
pub struct HybridRetrievalEngine<G: GraphRepository, D: DocumentRepository> {
    graph: Arc<G>,
    documents: Arc<D>,
    embeddings: EmbeddingService<G>,
    settings: RetrievalSettings,
}

impl<G: GraphRepository, D: DocumentRepository> HybridRetrievalEngine<G, D> {
    pub fn new(graph: Arc<G>, documents: Arc<D>, client: Arc<EmbeddingClient>) -> Self {
        Self {
            embeddings: EmbeddingService::new(graph.clone(), client),
            graph,
            documents,
            settings: RetrievalSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RetrievalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn embeddings(&self) -> &EmbeddingService<G> {
        &self.embeddings
    }

    // ========== Entity Search ==========

    /// Embedding search; an unavailable or failing backend gives no results
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<EntityType>,
    ) -> Result<Vec<SimilarEntity>> {
        match self
            .embeddings
            .find_similar_entities(query, limit, type_filter)
            .await
        {
            Ok(results) => Ok(results),
            Err(e) if is_embedding_outage(&e) => {
                debug!(error = %e, "Semantic search unavailable, returning no results");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Case-insensitive substring match over names and descriptions
    pub async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<Entity>> {
        self.graph.search_entities(query, limit).await
    }

    /// Union of semantic and keyword results, see [`merge_hybrid`]
    pub async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        semantic_weight: f64,
    ) -> Result<Vec<HybridHit>> {
        let semantic = self.semantic_search(query, top_k, None).await?;
        let keyword = self.keyword_search(query, top_k).await?;
        debug!(
            query = %query,
            semantic = semantic.len(),
            keyword = keyword.len(),
            "Hybrid search candidates"
        );
        Ok(merge_hybrid(semantic, keyword, semantic_weight, top_k))
    }

    /// Find an entity by name
    ///
    /// Tries the normalized name with the preferred type, then with any type,
    /// then the best keyword match.
    pub async fn resolve_entity(
        &self,
        name: &str,
        preferred_type: Option<EntityType>,
    ) -> Result<Option<Entity>> {
        let normalized = normalize(name);
        if !normalized.is_empty() {
            if preferred_type.is_some()
                && let Some(entity) = self
                    .graph
                    .get_entity_by_normalized_name(&normalized, preferred_type)
                    .await?
            {
                return Ok(Some(entity));
            }
            if let Some(entity) = self.graph.get_entity_by_normalized_name(&normalized, None).await? {
                return Ok(Some(entity));
            }
        }
        Ok(self.graph.search_entities(name, 1).await?.into_iter().next())
    }

    // ========== Context and Documents ==========

    /// Triples and provenance within `hops` of the given entities
    pub async fn expand_graph_context(&self, entity_ids: &[String], hops: u32) -> Result<GraphContext> {
        expand_graph_context(self.graph.as_ref(), entity_ids, hops).await
    }

    /// Nearest chunks to the query; empty when embeddings are unavailable
    pub async fn vector_documents(&self, query: &str, limit: usize) -> Result<Vec<ChunkMatch>> {
        let vector = match self.embeddings.client().embed(query).await {
            Ok(vector) => vector,
            Err(e) if is_embedding_outage(&e) => {
                debug!(error = %e, "Vector search unavailable");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        self.documents.search_chunks(&vector, limit).await
    }

    /// Fuse vector hits with one representative chunk per context article
    ///
    /// A graph article's entity similarity is the best similarity among the
    /// seeds that cite it.
    pub async fn retrieve_documents(
        &self,
        query: &str,
        seeds: &[SeedEntity],
        context: &GraphContext,
    ) -> Result<Vec<FusedDocument>> {
        let top_k = self.settings.top_k;
        let vector = self.vector_documents(query, top_k).await?;

        let mut article_similarity: HashMap<&str, f64> = HashMap::new();
        for seed in seeds {
            for article_id in &seed.entity.source_article_ids {
                let best = article_similarity.entry(article_id.as_str()).or_insert(0.0);
                if seed.similarity > *best {
                    *best = seed.similarity;
                }
            }
        }

        let mut graph = Vec::with_capacity(context.article_ids.len());
        for article_id in &context.article_ids {
            if let Some(chunk) = self.documents.first_chunk(article_id).await? {
                graph.push(GraphDocument {
                    chunk,
                    entity_similarity: article_similarity
                        .get(article_id.as_str())
                        .copied()
                        .unwrap_or(0.0),
                });
            }
        }

        Ok(fuse_documents(vector, graph, self.settings.vector_weight, top_k))
    }

    /// Documents from the vector store alone
    pub async fn vector_only(&self, query: &str) -> Result<Vec<FusedDocument>> {
        let vector = self.vector_documents(query, self.settings.top_k).await?;
        Ok(fuse_documents(
            vector,
            Vec::new(),
            self.settings.vector_weight,
            self.settings.top_k,
        ))
    }

    /// Hybrid entity search, graph context around the hits and fused documents
    pub async fn search(&self, query: &str) -> Result<SearchPayload> {
        let hits = self
            .hybrid_search(query, self.settings.top_k, self.settings.semantic_weight)
            .await?;
        let seeds: Vec<SeedEntity> = hits.iter().map(SeedEntity::from).collect();
        let ids: Vec<String> = seeds.iter().map(|s| s.entity.id.clone()).collect();
        let context = self.expand_graph_context(&ids, self.settings.graph_hops).await?;
        let documents = self.retrieve_documents(query, &seeds, &context).await?;

        Ok(SearchPayload {
            hits,
            context,
            documents,
        })
    }

    // ========== Question Answering ==========

    /// Classify, route and answer a question
    ///
    /// Falls back to vector-only documents when the graph store is
    /// unavailable.
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let classification = classify(question);
        let route = route(&classification, question);
        info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            route = ?route,
            "Answering question"
        );

        let (mode, payload) = match self.answer_route(&route, question).await {
            Ok(payload) => (RetrievalMode::Hybrid, payload),
            Err(e) if e.is_store_unavailable() => {
                warn!(error = %e, "Graph store unavailable, falling back to vector-only retrieval");
                let documents = self.vector_only(question).await?;
                (RetrievalMode::VectorOnly, QueryPayload::Documents(documents))
            }
            Err(e) => return Err(e),
        };

        Ok(QueryResponse {
            question: question.to_string(),
            classification,
            route,
            mode,
            payload,
        })
    }

    async fn answer_route(&self, route: &Route, question: &str) -> Result<QueryPayload> {
        match route {
            Route::Profile { profile, subject } => {
                match self.profile_by_name(subject, *profile).await? {
                    Some(profile) => Ok(QueryPayload::Profile(profile)),
                    None => {
                        debug!(subject = %subject, "Profile subject not found, searching instead");
                        Ok(QueryPayload::Search(self.search(question).await?))
                    }
                }
            }
            Route::SectorListing {
                filters,
                funded_only,
            } => Ok(QueryPayload::SectorListing(
                self.list_companies(filters, *funded_only).await?,
            )),
            Route::Insights { topic } => Ok(QueryPayload::Insights(
                self.insights(topic.as_deref()).await?,
            )),
            Route::MultiHop => Ok(QueryPayload::MultiHop(self.multi_hop(question).await?)),
            Route::HybridSearch => Ok(QueryPayload::Search(self.search(question).await?)),
        }
    }

    // ========== Profiles ==========

    /// Run a profile template for an entity
    pub async fn profile(&self, entity: Entity, profile: GraphProfile) -> Result<EntityProfile> {
        let mut groups: Vec<ProfileGroup> = Vec::new();
        let mut seen: HashSet<(&'static str, String)> = HashSet::new();

        for section in profile.template() {
            let connected = self
                .graph
                .get_connected_entities(&entity.id, section.relationship_type, section.direction)
                .await?;

            for related in connected {
                if related.id == entity.id || !seen.insert((section.label, related.id.clone())) {
                    continue;
                }
                match groups.iter_mut().find(|g| g.label == section.label) {
                    Some(group) => group.entities.push(related),
                    None => groups.push(ProfileGroup {
                        label: section.label,
                        entities: vec![related],
                    }),
                }
            }
        }

        Ok(EntityProfile {
            entity,
            profile,
            groups,
        })
    }

    /// Resolve a name and profile it
    ///
    /// When the entity resolves to another type, the profile for that type
    /// is used instead.
    pub async fn profile_by_name(
        &self,
        name: &str,
        profile: GraphProfile,
    ) -> Result<Option<EntityProfile>> {
        let Some(entity) = self.resolve_entity(name, Some(profile.entity_type())).await? else {
            return Ok(None);
        };
        let profile = if entity.entity_type == profile.entity_type() {
            profile
        } else {
            GraphProfile::for_entity_type(entity.entity_type)
        };
        self.profile(entity, profile).await.map(Some)
    }

    // ========== Sector Listings ==========

    /// Companies in a sector, optionally only funded ones
    ///
    /// With `recent`, a company needs an article dated within
    /// [`RECENT_WINDOW_DAYS`]: one of its funding articles when
    /// `funded_only`, otherwise any of its articles.
    pub async fn list_companies(
        &self,
        filters: &QueryFilters,
        funded_only: bool,
    ) -> Result<SectorListing> {
        let mut candidates = self.graph.list_entities(Some(EntityType::Company)).await?;
        candidates.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        let cutoff = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
        let mut published: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        let mut companies = Vec::new();

        for entity in candidates {
            if companies.len() >= MAX_LISTED_COMPANIES {
                break;
            }
            if let Some(sector) = &filters.sector
                && !mentions_sector(&entity, sector)
            {
                continue;
            }

            let mut investor_ids: Vec<String> = Vec::new();
            let mut funding_articles: Vec<String> = Vec::new();
            for edge in self.graph.list_relationships_for_entity(&entity.id).await? {
                let investor = match edge.relationship_type {
                    RelationshipType::FundedBy if edge.source_id == entity.id => edge.target_id,
                    RelationshipType::InvestsIn if edge.target_id == entity.id => edge.source_id,
                    _ => continue,
                };
                if !investor_ids.contains(&investor) {
                    investor_ids.push(investor);
                }
                if let Some(article_id) = edge.source_article_id {
                    funding_articles.push(article_id);
                }
            }
            if funded_only && investor_ids.is_empty() {
                continue;
            }

            if filters.recent {
                let articles = if funded_only {
                    funding_articles
                } else {
                    let mut all = entity.source_article_ids.clone();
                    all.extend(funding_articles);
                    all
                };
                let mut recent = false;
                for article_id in articles {
                    if self.published_at(&article_id, &mut published).await?.is_some_and(|d| d >= cutoff) {
                        recent = true;
                        break;
                    }
                }
                if !recent {
                    continue;
                }
            }

            let mut investors = Vec::with_capacity(investor_ids.len());
            for id in &investor_ids {
                if let Some(investor) = self.graph.get_entity(id).await? {
                    investors.push(investor.name);
                }
            }
            companies.push(ListedCompany { entity, investors });
        }

        debug!(
            sector = ?filters.sector,
            recent = filters.recent,
            funded_only,
            companies = companies.len(),
            "Sector listing"
        );

        Ok(SectorListing {
            filters: filters.clone(),
            funded_only,
            companies,
        })
    }

    async fn published_at(
        &self,
        article_id: &str,
        cache: &mut HashMap<String, Option<DateTime<Utc>>>,
    ) -> Result<Option<DateTime<Utc>>> {
        if let Some(date) = cache.get(article_id) {
            return Ok(*date);
        }
        let date = self
            .graph
            .get_article(article_id)
            .await?
            .and_then(|a| a.published_at());
        cache.insert(article_id.to_string(), date);
        Ok(date)
    }

    // ========== Multi-hop, Comparison and Insights ==========

    /// Shortest path between two entities, bounded by `max_path_depth`
    pub async fn connecting_path(&self, source_id: &str, target_id: &str) -> Result<Option<ConnectingPath>> {
        let Some(path) = self
            .graph
            .find_path(source_id, target_id, self.settings.max_path_depth)
            .await?
        else {
            return Ok(None);
        };

        let mut steps = Vec::with_capacity(path.len());
        for step in path {
            let entity_name = self
                .graph
                .get_entity(&step.entity_id)
                .await?
                .map(|e| e.name)
                .unwrap_or_else(|| step.entity_id.clone());
            steps.push(ConnectingStep {
                entity_name,
                relationship_type: step.relationship.as_ref().map(|r| r.relationship_type),
                strength: step.relationship.as_ref().map(|r| r.strength),
                entity_id: step.entity_id,
            });
        }
        Ok(Some(ConnectingPath { steps }))
    }

    /// Seed entities for a question: named entities first, then search hits
    pub async fn find_seeds(&self, question: &str) -> Result<Vec<SeedEntity>> {
        let mut seeds: Vec<SeedEntity> = Vec::new();

        for name in extract_names(question) {
            if seeds.len() >= MAX_SEEDS {
                break;
            }
            if let Some(entity) = self.resolve_entity(&name, None).await?
                && !seeds.iter().any(|s| s.entity.id == entity.id)
            {
                seeds.push(SeedEntity {
                    entity,
                    similarity: 1.0,
                });
            }
        }

        let hits = self
            .hybrid_search(question, MAX_SEEDS, self.settings.semantic_weight)
            .await?;
        for hit in &hits {
            if seeds.len() >= MAX_SEEDS {
                break;
            }
            if !seeds.iter().any(|s| s.entity.id == hit.entity.id) {
                seeds.push(SeedEntity::from(hit));
            }
        }

        Ok(seeds)
    }

    /// Expand around the seeds of a question and connect the first two
    pub async fn multi_hop(&self, question: &str) -> Result<MultiHopResult> {
        let seeds = self.find_seeds(question).await?;
        let ids: Vec<String> = seeds.iter().map(|s| s.entity.id.clone()).collect();
        let context = self.expand_graph_context(&ids, self.settings.graph_hops).await?;

        let path = match seeds.as_slice() {
            [first, second, ..] => self.connecting_path(&first.entity.id, &second.entity.id).await?,
            _ => None,
        };
        let documents = self.retrieve_documents(question, &seeds, &context).await?;

        info!(
            seeds = seeds.len(),
            triples = context.triples.len(),
            path_hops = path.as_ref().map(|p| p.hops()),
            "Multi-hop retrieval"
        );

        Ok(MultiHopResult {
            seeds,
            context,
            path,
            documents,
        })
    }

    /// Compare two named entities
    pub async fn compare(&self, left: &str, right: &str) -> Result<Comparison> {
        let left_entity = self
            .resolve_entity(left, None)
            .await?
            .ok_or_else(|| Error::EntityNotFound(left.to_string()))?;
        let right_entity = self
            .resolve_entity(right, None)
            .await?
            .ok_or_else(|| Error::EntityNotFound(right.to_string()))?;

        let left_neighbors: HashSet<String> = self
            .graph
            .get_neighborhood(&left_entity.id, 1, None)
            .await?
            .into_iter()
            .map(|n| n.entity.id)
            .collect();
        let mut shared_neighbors: Vec<Entity> = self
            .graph
            .get_neighborhood(&right_entity.id, 1, None)
            .await?
            .into_iter()
            .map(|n| n.entity)
            .filter(|e| {
                left_neighbors.contains(&e.id) && e.id != left_entity.id && e.id != right_entity.id
            })
            .collect();
        shared_neighbors.sort_by(|a, b| a.name.cmp(&b.name));

        let path = self.connecting_path(&left_entity.id, &right_entity.id).await?;
        let context = self
            .expand_graph_context(
                &[left_entity.id.clone(), right_entity.id.clone()],
                1,
            )
            .await?;

        let left_profile = GraphProfile::for_entity_type(left_entity.entity_type);
        let right_profile = GraphProfile::for_entity_type(right_entity.entity_type);
        Ok(Comparison {
            left: self.profile(left_entity, left_profile).await?,
            right: self.profile(right_entity, right_profile).await?,
            shared_neighbors,
            path,
            context,
        })
    }

    /// Statistics, largest communities and strongest relationships
    ///
    /// With a topic, the strongest relationships come from the graph context
    /// of the topic's search hits.
    pub async fn insights(&self, topic: Option<&str>) -> Result<GraphInsights> {
        let stats = self.graph.get_stats().await?;

        let mut sizes = self.graph.list_communities().await?;
        sizes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let mut communities = Vec::new();
        for (community_id, size) in sizes.into_iter().take(INSIGHT_COMMUNITIES) {
            let mut members = self.graph.list_entities_in_community(community_id).await?;
            members.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then_with(|| a.name.cmp(&b.name)));
            communities.push(CommunityOverview {
                community_id,
                size,
                top_members: members
                    .into_iter()
                    .take(COMMUNITY_PREVIEW)
                    .map(|e| e.name)
                    .collect(),
            });
        }

        let mut strongest = match topic {
            Some(topic) => {
                let hits = self
                    .hybrid_search(topic, self.settings.top_k, self.settings.semantic_weight)
                    .await?;
                let ids: Vec<String> = hits.iter().map(|h| h.entity.id.clone()).collect();
                self.expand_graph_context(&ids, 1).await?.triples
            }
            None => self.strongest_triples().await?,
        };
        strongest.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));
        strongest.truncate(INSIGHT_TRIPLES);

        Ok(GraphInsights {
            topic: topic.map(str::to_string),
            stats,
            communities,
            strongest,
        })
    }

    async fn strongest_triples(&self) -> Result<Vec<RelationshipTriple>> {
        let mut edges = self.graph.list_relationships(None).await?;
        edges.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));

        let mut names: HashMap<String, String> = HashMap::new();
        let mut triples = Vec::new();
        for edge in edges.into_iter().take(INSIGHT_TRIPLES) {
            let source = self.entity_name(&edge.source_id, &mut names).await?;
            let target = self.entity_name(&edge.target_id, &mut names).await?;
            triples.push(RelationshipTriple {
                source,
                relationship_type: edge.relationship_type,
                target,
                strength: edge.strength,
            });
        }
        Ok(triples)
    }

    async fn entity_name(&self, id: &str, cache: &mut HashMap<String, String>) -> Result<String> {
        if let Some(name) = cache.get(id) {
            return Ok(name.clone());
        }
        let name = self
            .graph
            .get_entity(id)
            .await?
            .map(|e| e.name)
            .unwrap_or_else(|| id.to_string());
        cache.insert(id.to_string(), name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::EmbeddingBackend;
    use crate::domain::knowledge::{Article, ArticleChunk, Relationship};
    use crate::domain::retrieval::search::MatchSource;
    use crate::infrastructure::documents::SqliteDocumentRepository;
    use crate::infrastructure::knowledge::SqliteGraphRepository;
    use crate::storage::migrations::run_migrations;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    type Engine = HybridRetrievalEngine<SqliteGraphRepository, SqliteDocumentRepository>;

    struct KeywordBackend;

    #[async_trait]
    impl EmbeddingBackend for KeywordBackend {
        fn identifier(&self) -> &str {
            "test:keywords"
        }

        async fn load(&self) -> Result<usize> {
            Ok(3)
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("chips") { 1.0 } else { 0.0 },
                if text.contains("earnings") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn setup(client: EmbeddingClient) -> (Arc<SqliteGraphRepository>, Arc<SqliteDocumentRepository>, Engine) {
        let pool = pool().await;
        let graph = Arc::new(SqliteGraphRepository::new(pool.clone()));
        let documents = Arc::new(SqliteDocumentRepository::new(pool));
        let engine = HybridRetrievalEngine::new(graph.clone(), documents.clone(), Arc::new(client));
        (graph, documents, engine)
    }

    async fn save(graph: &SqliteGraphRepository, entities: &[&Entity]) {
        for entity in entities {
            graph.save_entity(entity).await.unwrap();
        }
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }

    #[tokio::test]
    async fn test_keyword_only_without_embeddings() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let stripe = Entity::new("Stripe", EntityType::Company).with_description("Payments platform");
        save(&graph, &[&stripe]).await;

        assert!(engine.semantic_search("payments", 5, None).await.unwrap().is_empty());

        let hits = engine.hybrid_search("payments", 5, 0.7).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id, stripe.id);
        assert_eq!(hits[0].source, MatchSource::Keyword);
        assert!((hits[0].score - 0.3).abs() < 1e-9);
    }

    struct UnreachableBackend;

    #[async_trait]
    impl EmbeddingBackend for UnreachableBackend {
        fn identifier(&self) -> &str {
            "test:unreachable"
        }

        async fn load(&self) -> Result<usize> {
            Ok(3)
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            reqwest::get("http://127.0.0.1:1/embeddings").await?;
            Ok(vec![0.0; 3])
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_keywords() {
        let (graph, _, engine) = setup(EmbeddingClient::new(Arc::new(UnreachableBackend))).await;
        let nvidia = Entity::new("Nvidia", EntityType::Company)
            .with_description("Quarterly Nvidia earnings report");
        save(&graph, &[&nvidia]).await;

        assert!(engine.semantic_search("chips", 5, None).await.unwrap().is_empty());
        assert!(engine.vector_documents("chips", 5).await.unwrap().is_empty());

        let response = engine.query("Nvidia earnings").await.unwrap();
        assert_eq!(response.mode, RetrievalMode::Hybrid);
        let QueryPayload::Search(search) = response.payload else {
            panic!("expected search results, got {:?}", response.payload);
        };
        assert_eq!(search.hits.len(), 1);
        assert_eq!(search.hits[0].entity.id, nvidia.id);
        assert_eq!(search.hits[0].source, MatchSource::Keyword);
    }

    #[tokio::test]
    async fn test_query_company_profile() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let anthropic = Entity::new("Anthropic", EntityType::Company);
        let google = Entity::new("Google", EntityType::Investor);
        let dario = Entity::new("Dario Amodei", EntityType::Person);
        save(&graph, &[&anthropic, &google, &dario]).await;
        graph
            .save_relationship(&Relationship::new(&anthropic.id, &google.id, RelationshipType::FundedBy))
            .await
            .unwrap();
        graph
            .save_relationship(&Relationship::new(&anthropic.id, &dario.id, RelationshipType::FoundedBy))
            .await
            .unwrap();

        let response = engine.query("Tell me about Anthropic").await.unwrap();
        assert_eq!(response.mode, RetrievalMode::Hybrid);
        let QueryPayload::Profile(profile) = response.payload else {
            panic!("expected a profile, got {:?}", response.payload);
        };
        assert_eq!(profile.entity.id, anthropic.id);
        assert_eq!(profile.profile, GraphProfile::Company);
        assert_eq!(profile.names("investors"), vec!["Google"]);
        assert_eq!(profile.names("founders"), vec!["Dario Amodei"]);
        assert!(profile.group("competitors").is_none());
    }

    #[tokio::test]
    async fn test_profile_follows_resolved_type() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let sequoia = Entity::new("Sequoia Capital", EntityType::Investor);
        let stripe = Entity::new("Stripe", EntityType::Company);
        save(&graph, &[&sequoia, &stripe]).await;
        graph
            .save_relationship(&Relationship::new(&sequoia.id, &stripe.id, RelationshipType::InvestsIn))
            .await
            .unwrap();

        let profile = engine
            .profile_by_name("Sequoia Capital", GraphProfile::Company)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.profile, GraphProfile::Investor);
        assert_eq!(profile.names("portfolio"), vec!["Stripe"]);

        assert!(engine.profile_by_name("Nobody", GraphProfile::Person).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_funded_sector_listing() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let anthropic = Entity::new("Anthropic", EntityType::Company).with_description("AI safety company");
        let stale = Entity::new("Stale Labs", EntityType::Company).with_description("An AI lab");
        let chain = Entity::new("Chainlink", EntityType::Company).with_description("Blockchain oracles");
        let unfunded = Entity::new("Quiet AI", EntityType::Company);
        let google = Entity::new("Google", EntityType::Investor);
        save(&graph, &[&anthropic, &stale, &chain, &unfunded, &google]).await;

        graph
            .save_article(&Article::new("art-new", "Anthropic raises").with_published_date(days_ago(10)))
            .await
            .unwrap();
        graph
            .save_article(&Article::new("art-old", "Stale raises").with_published_date(days_ago(400)))
            .await
            .unwrap();
        graph
            .save_relationship(
                &Relationship::new(&anthropic.id, &google.id, RelationshipType::FundedBy)
                    .with_source_article("art-new"),
            )
            .await
            .unwrap();
        graph
            .save_relationship(
                &Relationship::new(&google.id, &stale.id, RelationshipType::InvestsIn)
                    .with_source_article("art-old"),
            )
            .await
            .unwrap();

        let response = engine
            .query("Which AI startups raised funding recently?")
            .await
            .unwrap();
        let QueryPayload::SectorListing(listing) = response.payload else {
            panic!("expected a sector listing, got {:?}", response.payload);
        };
        assert!(listing.funded_only);
        assert_eq!(listing.companies.len(), 1);
        assert_eq!(listing.companies[0].entity.id, anthropic.id);
        assert_eq!(listing.companies[0].investors, vec!["Google"]);

        let all_time = engine
            .list_companies(
                &QueryFilters {
                    sector: Some("ai".to_string()),
                    recent: false,
                },
                true,
            )
            .await
            .unwrap();
        let names: HashSet<&str> = all_time.companies.iter().map(|c| c.entity.name.as_str()).collect();
        assert_eq!(names, HashSet::from(["Anthropic", "Stale Labs"]));

        let sector = engine
            .list_companies(
                &QueryFilters {
                    sector: Some("blockchain".to_string()),
                    recent: false,
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(sector.companies.len(), 1);
        assert_eq!(sector.companies[0].entity.id, chain.id);
    }

    #[test]
    fn test_sector_matching_uses_whole_words() {
        let paid = Entity::new("Paid Inc", EntityType::Company).with_description("Billing tools");
        assert!(!mentions_sector(&paid, "ai"));
        let lab = Entity::new("Lab", EntityType::Company).with_description("Generative models");
        assert!(mentions_sector(&lab, "ai"));
        let ml = Entity::new("Vision Co", EntityType::Company).with_description("machine-learning APIs");
        assert!(mentions_sector(&ml, "ml"));
    }

    #[tokio::test]
    async fn test_multi_hop_path() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let nvidia = Entity::new("Nvidia", EntityType::Company);
        let openai = Entity::new("OpenAI", EntityType::Company).with_source_article("art-1");
        let microsoft = Entity::new("Microsoft", EntityType::Investor);
        save(&graph, &[&nvidia, &openai, &microsoft]).await;
        graph
            .save_relationship(&Relationship::new(&nvidia.id, &openai.id, RelationshipType::PartnersWith))
            .await
            .unwrap();
        graph
            .save_relationship(&Relationship::new(&microsoft.id, &openai.id, RelationshipType::InvestsIn))
            .await
            .unwrap();

        let response = engine.query("How is Nvidia linked to Microsoft?").await.unwrap();
        assert_eq!(response.route, Route::MultiHop);
        let QueryPayload::MultiHop(result) = response.payload else {
            panic!("expected multi-hop, got {:?}", response.payload);
        };
        assert_eq!(result.seeds[0].entity.id, nvidia.id);
        assert_eq!(result.seeds[1].entity.id, microsoft.id);
        assert_eq!(result.seeds[0].similarity, 1.0);

        let path = result.path.unwrap();
        assert_eq!(path.hops(), 2);
        assert_eq!(
            path.render(),
            "Nvidia -[PARTNERS_WITH]- OpenAI -[INVESTS_IN]- Microsoft"
        );
        assert_eq!(result.context.triples.len(), 2);
    }

    #[tokio::test]
    async fn test_compare() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let openai = Entity::new("OpenAI", EntityType::Company);
        let anthropic = Entity::new("Anthropic", EntityType::Company);
        let nvidia = Entity::new("Nvidia", EntityType::Company);
        save(&graph, &[&openai, &anthropic, &nvidia]).await;
        for company in [&openai, &anthropic] {
            graph
                .save_relationship(&Relationship::new(&company.id, &nvidia.id, RelationshipType::PartnersWith))
                .await
                .unwrap();
        }
        graph
            .save_relationship(&Relationship::new(&openai.id, &anthropic.id, RelationshipType::CompetesWith))
            .await
            .unwrap();

        let comparison = engine.compare("OpenAI", "Anthropic").await.unwrap();
        assert_eq!(comparison.shared_neighbors.len(), 1);
        assert_eq!(comparison.shared_neighbors[0].id, nvidia.id);
        assert_eq!(comparison.path.unwrap().hops(), 1);
        assert_eq!(comparison.left.names("competitors"), vec!["Anthropic"]);
        assert_eq!(comparison.right.names("partners"), vec!["Nvidia"]);

        let missing = engine.compare("OpenAI", "Nobody").await;
        assert!(matches!(missing, Err(Error::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn test_insights() {
        let (graph, _, engine) = setup(EmbeddingClient::disabled("off")).await;
        let a = Entity::new("Alpha", EntityType::Company);
        let b = Entity::new("Beta", EntityType::Company);
        let c = Entity::new("Gamma", EntityType::Company);
        save(&graph, &[&a, &b, &c]).await;
        graph
            .save_relationship(&Relationship::new(&a.id, &b.id, RelationshipType::PartnersWith).with_strength(9.0))
            .await
            .unwrap();
        graph
            .save_relationship(&Relationship::new(&b.id, &c.id, RelationshipType::CompetesWith).with_strength(2.0))
            .await
            .unwrap();
        graph
            .replace_community_assignments(&[
                (a.id.clone(), 0),
                (b.id.clone(), 0),
                (c.id.clone(), 1),
            ])
            .await
            .unwrap();

        let insights = engine.insights(None).await.unwrap();
        assert_eq!(insights.stats.total_entities, 3);
        assert_eq!(insights.communities[0].community_id, 0);
        assert_eq!(insights.communities[0].size, 2);
        assert_eq!(insights.strongest[0].render(), "Alpha -[PARTNERS_WITH]-> Beta");
        assert_eq!(insights.strongest.len(), 2);

        let focused = engine.insights(Some("Gamma")).await.unwrap();
        assert_eq!(focused.strongest.len(), 1);
        assert_eq!(focused.strongest[0].target, "Gamma");
    }

    #[tokio::test]
    async fn test_search_fuses_graph_documents() {
        let (graph, documents, engine) = setup(EmbeddingClient::new(Arc::new(KeywordBackend))).await;
        let nvidia = Entity::new("Nvidia", EntityType::Company)
            .with_description("Chips maker")
            .with_source_article("art-1");
        save(&graph, &[&nvidia]).await;
        graph.save_article(&Article::new("art-1", "Nvidia news")).await.unwrap();
        graph.save_article(&Article::new("art-2", "Earnings roundup")).await.unwrap();
        documents
            .save_chunk(&ArticleChunk::new("art-1", 0, "Nvidia ships chips").with_embedding(vec![1.0, 0.0, 0.1], "test:keywords"))
            .await
            .unwrap();
        documents
            .save_chunk(&ArticleChunk::new("art-2", 0, "Quarterly earnings").with_embedding(vec![0.0, 1.0, 0.1], "test:keywords"))
            .await
            .unwrap();

        let payload = engine.search("Nvidia").await.unwrap();
        assert_eq!(payload.hits.len(), 1);
        assert_eq!(payload.context.article_ids, vec!["art-1"]);
        let graph_doc = payload
            .documents
            .iter()
            .find(|d| d.article_id == "art-1")
            .unwrap();
        assert!(graph_doc.score > 0.0);
    }

    #[tokio::test]
    async fn test_store_unavailable_falls_back_to_vectors() {
        let graph_pool = pool().await;
        let document_pool = pool().await;
        let documents = Arc::new(SqliteDocumentRepository::new(document_pool.clone()));
        SqliteGraphRepository::new(document_pool)
            .save_article(&Article::new("art-1", "Nvidia earnings"))
            .await
            .unwrap();
        documents
            .save_chunk(&ArticleChunk::new("art-1", 0, "Record quarter").with_embedding(vec![0.0, 1.0, 0.1], "test:keywords"))
            .await
            .unwrap();

        let graph = Arc::new(SqliteGraphRepository::new(graph_pool.clone()));
        graph_pool.close().await;
        let engine = HybridRetrievalEngine::new(
            graph,
            documents,
            Arc::new(EmbeddingClient::new(Arc::new(KeywordBackend))),
        );

        let response = engine.query("nvidia earnings").await.unwrap();
        assert_eq!(response.mode, RetrievalMode::VectorOnly);
        let QueryPayload::Documents(documents) = response.payload else {
            panic!("expected documents, got {:?}", response.payload);
        };
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].title, "Nvidia earnings");
    }
}
