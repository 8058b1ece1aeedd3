//! Relationship strength scoring
//!
//! [`RelationshipScorer`] recomputes the 0-10 strength of every edge from
//! how often it was observed, how recent its source article is, how the
//! description is phrased and how much context it carries.

mod factors;
mod scorer;

pub use factors::{context_score, credibility_score, frequency_score, recency_score, DEFAULT_RECENCY};
pub use scorer::{
    score_with, ArticleMetadata, RelationshipScorer, ScoreBreakdown, ScoringReport, ScoringRun,
    ScoringWeights,
};
