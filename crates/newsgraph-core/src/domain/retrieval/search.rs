//! Hybrid entity search scoring

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::domain::embedding::SimilarEntity;
use crate::domain::knowledge::Entity;

/// Which search found an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Semantic,
    Keyword,
    Both,
}

/// An entity ranked by hybrid search
#[derive(Debug, Clone)]
pub struct HybridHit {
    pub entity: Entity,
    pub score: f64,
    /// Cosine similarity when the semantic search found it
    pub similarity: Option<f32>,
    pub source: MatchSource,
}

/// Combine semantic and keyword results keyed by entity id
///
/// * semantic only: `similarity * w`
/// * keyword only: `1 - w`
/// * both: `similarity * w + (1 - w)`
///
/// The keyword boost is additive, so an entity found by both searches can
/// outscore anything found by one. Ties keep semantic order first.
pub fn merge_hybrid(
    semantic: Vec<SimilarEntity>,
    keyword: Vec<Entity>,
    semantic_weight: f64,
    top_k: usize,
) -> Vec<HybridHit> {
    let keyword_score = 1.0 - semantic_weight;
    let mut hits: Vec<HybridHit> = Vec::with_capacity(semantic.len() + keyword.len());
    let mut position: HashMap<String, usize> = HashMap::new();

    for SimilarEntity { entity, similarity } in semantic {
        if position.contains_key(&entity.id) {
            continue;
        }
        position.insert(entity.id.clone(), hits.len());
        hits.push(HybridHit {
            score: similarity as f64 * semantic_weight,
            similarity: Some(similarity),
            source: MatchSource::Semantic,
            entity,
        });
    }

    for entity in keyword {
        match position.get(&entity.id) {
            Some(&idx) => {
                let hit = &mut hits[idx];
                if hit.source == MatchSource::Semantic {
                    hit.score += keyword_score;
                    hit.source = MatchSource::Both;
                }
            }
            None => {
                position.insert(entity.id.clone(), hits.len());
                hits.push(HybridHit {
                    entity,
                    score: keyword_score,
                    similarity: None,
                    source: MatchSource::Keyword,
                });
            }
        }
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    hits
}
