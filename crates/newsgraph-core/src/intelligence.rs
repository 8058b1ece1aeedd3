//! The assembled intelligence layer
//!
//! Wires repositories and services from a [`Config`] and runs the periodic
//! maintenance passes in order: dedup, scoring, communities, embeddings.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::community::{CommunityDetector, CommunityReport};
use crate::domain::embedding::{EmbeddingClient, EmbeddingReport, EmbeddingService};
use crate::domain::knowledge::KnowledgeGraphService;
use crate::domain::resolution::{EntityResolver, MergeReport};
use crate::domain::retrieval::HybridRetrievalEngine;
use crate::domain::scoring::{RelationshipScorer, ScoringReport, ScoringWeights};
use crate::error::{ErrorCategory, Result};
use crate::infrastructure::analytics::detector_from_settings;
use crate::infrastructure::documents::SqliteDocumentRepository;
use crate::infrastructure::embedding::client_from_settings;
use crate::infrastructure::knowledge::SqliteGraphRepository;
use crate::storage::{Database, DatabaseConfig};

/// Reports from one maintenance run
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub dedup: MergeReport,
    pub scoring: ScoringReport,
    pub communities: CommunityReport,
    /// `None` when embeddings are disabled or the backend is unavailable
    pub embeddings: Option<EmbeddingReport>,
}

/// Every service of the intelligence layer over one SQLite pool
pub struct IntelligenceLayer {
    graph: Arc<SqliteGraphRepository>,
    ingest: KnowledgeGraphService<SqliteGraphRepository>,
    resolver: EntityResolver<SqliteGraphRepository>,
    scorer: RelationshipScorer<SqliteGraphRepository>,
    detector: CommunityDetector<SqliteGraphRepository>,
    embeddings: EmbeddingService<SqliteGraphRepository>,
    engine: HybridRetrievalEngine<SqliteGraphRepository, SqliteDocumentRepository>,
}

impl IntelligenceLayer {
    /// Validate the configuration, open the database and build every service
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let database = Database::new(DatabaseConfig::from_settings(&config.database)).await?;
        let client = client_from_settings(&config.embedding)?;
        Ok(Self::from_parts(database.pool().clone(), config, client)?)
    }

    /// Build services over an existing, migrated pool
    pub fn from_parts(pool: SqlitePool, config: &Config, client: EmbeddingClient) -> Result<Self> {
        let graph = Arc::new(SqliteGraphRepository::new(pool.clone()));
        let documents = Arc::new(SqliteDocumentRepository::new(pool));
        let client = Arc::new(client);

        Ok(Self {
            ingest: KnowledgeGraphService::new(graph.clone()),
            resolver: EntityResolver::new(graph.clone()).with_settings(config.resolver.clone()),
            scorer: RelationshipScorer::new(graph.clone())
                .with_weights(ScoringWeights::from(&config.scoring)),
            detector: detector_from_settings(graph.clone(), &config.community)?,
            embeddings: EmbeddingService::new(graph.clone(), client.clone()),
            engine: HybridRetrievalEngine::new(graph.clone(), documents, client)
                .with_settings(config.retrieval.clone()),
            graph,
        })
    }

    pub fn graph(&self) -> &Arc<SqliteGraphRepository> {
        &self.graph
    }

    pub fn ingest(&self) -> &KnowledgeGraphService<SqliteGraphRepository> {
        &self.ingest
    }

    pub fn resolver(&self) -> &EntityResolver<SqliteGraphRepository> {
        &self.resolver
    }

    pub fn scorer(&self) -> &RelationshipScorer<SqliteGraphRepository> {
        &self.scorer
    }

    pub fn detector(&self) -> &CommunityDetector<SqliteGraphRepository> {
        &self.detector
    }

    pub fn embeddings(&self) -> &EmbeddingService<SqliteGraphRepository> {
        &self.embeddings
    }

    pub fn engine(&self) -> &HybridRetrievalEngine<SqliteGraphRepository, SqliteDocumentRepository> {
        &self.engine
    }

    /// Run every maintenance pass once
    ///
    /// The embedding pass is skipped when the backend is disabled or cannot
    /// load; any other failure, and cancellation, stops the run.
    pub async fn run_maintenance(&self, cancel: &CancellationToken) -> Result<MaintenanceReport> {
        let dedup = self.resolver.run(false, cancel).await?;
        let scoring = self.scorer.update_all(None, cancel).await?;
        let communities = self.detector.detect_communities(cancel).await?;

        let embeddings = if self.embeddings.client().is_disabled() {
            None
        } else {
            match self.embeddings.generate_for_all(None, cancel).await {
                Ok(report) => Some(report),
                Err(e) if e.category() == ErrorCategory::EmbeddingUnavailable => {
                    warn!(error = %e, "Skipping embedding pass");
                    None
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            merged = dedup.merged(),
            scored = scoring.updated,
            communities = communities.communities,
            embedded = embeddings.as_ref().map(|r| r.stored),
            "Maintenance run finished"
        );

        Ok(MaintenanceReport {
            dedup,
            scoring,
            communities,
            embeddings,
        })
    }
}
