//! Vector and graph document fusion

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::domain::knowledge::ChunkMatch;

/// Which retrieval path produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    Vector,
    Graph,
    Both,
}

/// A document after fusion
#[derive(Debug, Clone, Serialize)]
pub struct FusedDocument {
    pub article_id: String,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub origin: DocumentOrigin,
}

/// A representative chunk of a graph-provenance article
#[derive(Debug, Clone)]
pub struct GraphDocument {
    pub chunk: ChunkMatch,
    /// Best similarity among the seed entities that cite the article
    pub entity_similarity: f64,
}

/// Merge vector hits and graph-derived articles by `(article_id, title)`
///
/// With `w` the vector weight:
/// * both: `w * vector + (1 - w) * entity_similarity`
/// * graph only: `(1 - w) * entity_similarity`
/// * vector only: the native vector score
///
/// Several vector chunks of one article keep the best scoring chunk.
pub fn fuse_documents(
    vector: Vec<ChunkMatch>,
    graph: Vec<GraphDocument>,
    vector_weight: f64,
    top_k: usize,
) -> Vec<FusedDocument> {
    let graph_weight = 1.0 - vector_weight;
    let mut documents: Vec<FusedDocument> = Vec::new();
    let mut position: HashMap<(String, String), usize> = HashMap::new();

    for chunk in vector {
        let key = (chunk.article_id.clone(), chunk.article_title.clone());
        let score = chunk.score as f64;
        match position.get(&key) {
            Some(&idx) => {
                if score > documents[idx].score {
                    documents[idx].score = score;
                    documents[idx].content = chunk.content;
                }
            }
            None => {
                position.insert(key, documents.len());
                documents.push(FusedDocument {
                    article_id: chunk.article_id,
                    title: chunk.article_title,
                    content: chunk.content,
                    score,
                    origin: DocumentOrigin::Vector,
                });
            }
        }
    }

    for GraphDocument {
        chunk,
        entity_similarity,
    } in graph
    {
        let key = (chunk.article_id.clone(), chunk.article_title.clone());
        match position.get(&key) {
            Some(&idx) => {
                let document = &mut documents[idx];
                match document.origin {
                    DocumentOrigin::Vector => {
                        document.score =
                            vector_weight * document.score + graph_weight * entity_similarity;
                        document.origin = DocumentOrigin::Both;
                    }
                    DocumentOrigin::Graph => {
                        let score = graph_weight * entity_similarity;
                        if score > document.score {
                            document.score = score;
                        }
                    }
                    DocumentOrigin::Both => {}
                }
            }
            None => {
                position.insert(key, documents.len());
                documents.push(FusedDocument {
                    article_id: chunk.article_id,
                    title: chunk.article_title,
                    content: chunk.content,
                    score: graph_weight * entity_similarity,
                    origin: DocumentOrigin::Graph,
                });
            }
        }
    }

    documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    documents.truncate(top_k);
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(article_id: &str, index: u32, score: f32) -> ChunkMatch {
        ChunkMatch {
            article_id: article_id.to_string(),
            article_title: format!("Title {}", article_id),
            chunk_index: index,
            content: format!("{} chunk {}", article_id, index),
            score,
        }
    }

    #[test]
    fn test_fusion_scores() {
        let fused = fuse_documents(
            vec![chunk("a", 0, 0.9), chunk("a", 1, 0.95), chunk("c", 0, 0.5)],
            vec![
                GraphDocument {
                    chunk: chunk("a", 0, 0.0),
                    entity_similarity: 0.5,
                },
                GraphDocument {
                    chunk: chunk("b", 0, 0.0),
                    entity_similarity: 0.8,
                },
            ],
            0.7,
            10,
        );

        let scores: HashMap<&str, (f64, DocumentOrigin)> = fused
            .iter()
            .map(|d| (d.article_id.as_str(), (d.score, d.origin)))
            .collect();

        let (a, origin) = scores["a"];
        assert!((a - (0.7 * 0.95 + 0.3 * 0.5)).abs() < 1e-6);
        assert_eq!(origin, DocumentOrigin::Both);

        let (b, origin) = scores["b"];
        assert!((b - 0.24).abs() < 1e-6);
        assert_eq!(origin, DocumentOrigin::Graph);

        let (c, origin) = scores["c"];
        assert!((c - 0.5).abs() < 1e-6);
        assert_eq!(origin, DocumentOrigin::Vector);

        assert_eq!(fused[0].article_id, "a");
        assert_eq!(fused[0].content, "a chunk 1");
    }

    #[test]
    fn test_fusion_truncates() {
        let fused = fuse_documents(
            vec![chunk("a", 0, 0.2), chunk("b", 0, 0.9)],
            Vec::new(),
            0.7,
            1,
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].article_id, "b");
    }
}
