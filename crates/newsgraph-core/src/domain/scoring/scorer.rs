//! Relationship strength scoring
//!
//! Strength is a weighted sum of five 0-10 sub-scores:
//!
//! ```text
//! 0.1 * base + 0.3 * frequency + 0.2 * recency + 0.3 * credibility + 0.2 * context
//! ```
//!
//! clamped to 0-10. The default weights sum to 1.1, so the clamp matters.
//! Frequency lookups are cached per edge key inside a [`ScoringRun`]; a new
//! run starts with an empty cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::factors::{context_score, credibility_score, frequency_score, recency_score};
use crate::config::ScoringSettings;
use crate::domain::knowledge::{
    parse_published_date, Article, GraphRepository, Relationship, RelationshipKey,
    RelationshipType, MAX_STRENGTH,
};
use crate::error::{Error, Result};

/// Publication data of the article an edge came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleMetadata {
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleMetadata {
    pub fn from_article(article: &Article) -> Self {
        Self {
            published_at: article.published_at(),
        }
    }

    /// Parse a raw published-date string; unparseable dates become `None`
    pub fn from_published_date(raw: &str) -> Self {
        Self {
            published_at: parse_published_date(raw),
        }
    }

    fn days_ago(&self, now: DateTime<Utc>) -> Option<f64> {
        self.published_at
            .map(|published| (now - published).num_seconds() as f64 / 86_400.0)
    }
}

/// The sub-scores behind one strength value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub frequency: f64,
    pub recency: f64,
    pub credibility: f64,
    pub context: f64,
    /// Weighted, clamped result
    pub total: f64,
}

/// Weights of the strength formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub base: f64,
    pub frequency: f64,
    pub recency: f64,
    pub credibility: f64,
    pub context: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::from(&ScoringSettings::default())
    }
}

impl From<&ScoringSettings> for ScoringWeights {
    fn from(settings: &ScoringSettings) -> Self {
        Self {
            base: settings.base_weight,
            frequency: settings.frequency_weight,
            recency: settings.recency_weight,
            credibility: settings.credibility_weight,
            context: settings.context_weight,
        }
    }
}

impl ScoringWeights {
    /// Combine sub-scores into a strength on the 0-10 scale
    pub fn combine(
        &self,
        base: f64,
        frequency: f64,
        recency: f64,
        credibility: f64,
        context: f64,
    ) -> ScoreBreakdown {
        let raw = self.base * base
            + self.frequency * frequency
            + self.recency * recency
            + self.credibility * credibility
            + self.context * context;
        let total = if raw.is_finite() {
            raw.clamp(0.0, MAX_STRENGTH)
        } else {
            0.0
        };

        ScoreBreakdown {
            base,
            frequency,
            recency,
            credibility,
            context,
            total,
        }
    }
}

/// Counts from a full rescoring pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringReport {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    /// Mean strength over the edges scored in this pass
    pub average_strength: f64,
}

/// State scoped to one scoring pass
pub struct ScoringRun<'a, R: GraphRepository> {
    repository: &'a R,
    weights: ScoringWeights,
    now: DateTime<Utc>,
    frequency_cache: HashMap<RelationshipKey, u64>,
    article_cache: HashMap<String, ArticleMetadata>,
}

impl<'a, R: GraphRepository> ScoringRun<'a, R> {
    fn new(repository: &'a R, weights: ScoringWeights, now: DateTime<Utc>) -> Self {
        Self {
            repository,
            weights,
            now,
            frequency_cache: HashMap::new(),
            article_cache: HashMap::new(),
        }
    }

    /// Observation count of an edge key, cached for the run
    pub async fn frequency(&mut self, key: &RelationshipKey) -> Result<u64> {
        if let Some(count) = self.frequency_cache.get(key) {
            return Ok(*count);
        }
        let count = self.repository.count_observations(key).await?;
        self.frequency_cache.insert(key.clone(), count);
        Ok(count)
    }

    /// Number of keys with a cached count
    pub fn cached_keys(&self) -> usize {
        self.frequency_cache.len()
    }

    async fn article_metadata(&mut self, article_id: Option<&str>) -> Result<ArticleMetadata> {
        let Some(article_id) = article_id else {
            return Ok(ArticleMetadata::default());
        };
        if let Some(metadata) = self.article_cache.get(article_id) {
            return Ok(metadata.clone());
        }
        let metadata = self
            .repository
            .get_article(article_id)
            .await?
            .map(|a| ArticleMetadata::from_article(&a))
            .unwrap_or_default();
        self.article_cache
            .insert(article_id.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// Score one edge against explicit article metadata
    pub async fn score(
        &mut self,
        relationship: &Relationship,
        article: &ArticleMetadata,
    ) -> Result<ScoreBreakdown> {
        let observations = self.frequency(&relationship.key()).await?;
        Ok(score_with(
            &self.weights,
            relationship.base_strength,
            observations,
            article.days_ago(self.now),
            &relationship.description,
            relationship.relationship_type,
        ))
    }

    /// Score one edge using the article it was extracted from
    pub async fn score_stored(&mut self, relationship: &Relationship) -> Result<ScoreBreakdown> {
        let article = self
            .article_metadata(relationship.source_article_id.as_deref())
            .await?;
        self.score(relationship, &article).await
    }
}

/// Pure strength computation
pub fn score_with(
    weights: &ScoringWeights,
    base: f64,
    observations: u64,
    days_ago: Option<f64>,
    description: &str,
    relationship_type: RelationshipType,
) -> ScoreBreakdown {
    let base = if base.is_finite() {
        base.clamp(0.0, MAX_STRENGTH)
    } else {
        0.0
    };
    weights.combine(
        base,
        frequency_score(observations),
        recency_score(days_ago),
        credibility_score(description),
        context_score(description, relationship_type),
    )
}

/// Relationship scoring service
pub struct RelationshipScorer<R: GraphRepository> {
    repository: Arc<R>,
    weights: ScoringWeights,
}

impl<R: GraphRepository> RelationshipScorer<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Start a pass with an empty frequency cache
    pub fn start_run(&self) -> ScoringRun<'_, R> {
        ScoringRun::new(self.repository.as_ref(), self.weights, Utc::now())
    }

    /// Score a single edge outside of a pass
    pub async fn score(
        &self,
        relationship: &Relationship,
        article: &ArticleMetadata,
    ) -> Result<f64> {
        let mut run = self.start_run();
        Ok(run.score(relationship, article).await?.total)
    }

    /// Recompute and write back the strength of every matching edge
    ///
    /// Each edge is isolated: a failure is logged and counted and the pass
    /// continues.
    pub async fn update_all(
        &self,
        type_filter: Option<RelationshipType>,
        cancel: &CancellationToken,
    ) -> Result<ScoringReport> {
        let mut run = self.start_run();
        let relationships = self.repository.list_relationships(type_filter).await?;

        info!(
            relationships = relationships.len(),
            relationship_type = ?type_filter,
            "Rescoring relationships"
        );

        let mut report = ScoringReport::default();
        let mut strength_sum = 0.0;

        for relationship in &relationships {
            if cancel.is_cancelled() {
                info!(processed = report.processed, "Rescoring cancelled");
                return Err(Error::Cancelled);
            }

            let breakdown = match run.score_stored(relationship).await {
                Ok(breakdown) => breakdown,
                Err(e) => {
                    warn!(relationship_id = %relationship.id, error = %e, "Failed to score relationship");
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .repository
                .set_relationship_strength(&relationship.id, breakdown.total)
                .await
            {
                Ok(true) => {
                    report.processed += 1;
                    strength_sum += breakdown.total;
                    if (breakdown.total - relationship.strength).abs() > f64::EPSILON {
                        report.updated += 1;
                    }
                    debug!(
                        relationship_id = %relationship.id,
                        old = relationship.strength,
                        new = breakdown.total,
                        "Relationship rescored"
                    );
                }
                Ok(false) => {
                    debug!(relationship_id = %relationship.id, "Relationship vanished during rescoring");
                }
                Err(e) => {
                    warn!(relationship_id = %relationship.id, error = %e, "Failed to write strength");
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            report.average_strength = strength_sum / report.processed as f64;
        }

        info!(
            processed = report.processed,
            updated = report.updated,
            failed = report.failed,
            cached_keys = run.cached_keys(),
            "Rescoring finished"
        );
        Ok(report)
    }
}
