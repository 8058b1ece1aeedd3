//! Graph-context expansion around seed entities

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::knowledge::{GraphRepository, RelationshipType};
use crate::error::Result;

/// Cap on relationship triples collected per expansion
pub const MAX_CONTEXT_TRIPLES: usize = 200;
/// Cap on provenance article ids collected per expansion
pub const MAX_CONTEXT_ARTICLES: usize = 200;

/// A relationship rendered with entity names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipTriple {
    pub source: String,
    pub relationship_type: RelationshipType,
    pub target: String,
    pub strength: f64,
}

impl RelationshipTriple {
    /// `Source -[TYPE]-> Target`
    pub fn render(&self) -> String {
        format!("{} -[{}]-> {}", self.source, self.relationship_type, self.target)
    }
}

/// Relationships and provenance around a set of entities
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphContext {
    pub triples: Vec<RelationshipTriple>,
    /// Source articles of the seed entities
    pub article_ids: Vec<String>,
}

impl GraphContext {
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty() && self.article_ids.is_empty()
    }
}

/// Collect distinct triples among everything within `hops` of the seeds
///
/// Unknown seed ids are ignored. Both lists are capped.
pub async fn expand_graph_context<R: GraphRepository + ?Sized>(
    repository: &R,
    entity_ids: &[String],
    hops: u32,
) -> Result<GraphContext> {
    let mut names: HashMap<String, String> = HashMap::new();
    let mut reachable: Vec<String> = Vec::new();
    let mut article_ids: Vec<String> = Vec::new();
    let mut seen_articles: HashSet<String> = HashSet::new();

    for id in entity_ids {
        let Some(seed) = repository.get_entity(id).await? else {
            continue;
        };
        for article_id in &seed.source_article_ids {
            if article_ids.len() < MAX_CONTEXT_ARTICLES && seen_articles.insert(article_id.clone()) {
                article_ids.push(article_id.clone());
            }
        }
        if names.insert(seed.id.clone(), seed.name.clone()).is_none() {
            reachable.push(seed.id.clone());
        }

        if hops == 0 {
            continue;
        }
        for neighbor in repository.get_neighborhood(&seed.id, hops, None).await? {
            let entity = neighbor.entity;
            if names.insert(entity.id.clone(), entity.name).is_none() {
                reachable.push(entity.id);
            }
        }
    }

    let mut triples = Vec::new();
    let mut seen_triples: HashSet<(String, RelationshipType, String)> = HashSet::new();
    'outer: for id in &reachable {
        for edge in repository.list_outgoing_relationships(id).await? {
            let (Some(source), Some(target)) = (names.get(&edge.source_id), names.get(&edge.target_id)) else {
                continue;
            };
            if !seen_triples.insert((edge.source_id.clone(), edge.relationship_type, edge.target_id.clone())) {
                continue;
            }
            triples.push(RelationshipTriple {
                source: source.clone(),
                relationship_type: edge.relationship_type,
                target: target.clone(),
                strength: edge.strength,
            });
            if triples.len() >= MAX_CONTEXT_TRIPLES {
                break 'outer;
            }
        }
    }

    Ok(GraphContext {
        triples,
        article_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Entity, EntityType, Relationship};
    use crate::infrastructure::knowledge::SqliteGraphRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteGraphRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqliteGraphRepository::new(pool)
    }

    #[tokio::test]
    async fn test_expansion_by_hops() {
        let repo = setup().await;
        let a = Entity::new("Anthropic", EntityType::Company)
            .with_source_article("art-1")
            .with_source_article("art-2");
        let b = Entity::new("Google", EntityType::Investor).with_source_article("art-3");
        let c = Entity::new("Alphabet", EntityType::Company);
        for e in [&a, &b, &c] {
            repo.save_entity(e).await.unwrap();
        }
        repo.save_relationship(&Relationship::new(&a.id, &b.id, RelationshipType::FundedBy))
            .await
            .unwrap();
        repo.save_relationship(&Relationship::new(&c.id, &b.id, RelationshipType::Acquired))
            .await
            .unwrap();

        let one_hop = expand_graph_context(&repo, &[a.id.clone()], 1).await.unwrap();
        assert_eq!(one_hop.triples.len(), 1);
        assert_eq!(one_hop.triples[0].render(), "Anthropic -[FUNDED_BY]-> Google");
        assert_eq!(one_hop.article_ids, vec!["art-1", "art-2"]);

        let two_hops = expand_graph_context(&repo, &[a.id.clone()], 2).await.unwrap();
        assert_eq!(two_hops.triples.len(), 2);

        let none = expand_graph_context(&repo, &["missing".to_string()], 2).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_triples_are_capped() {
        let repo = setup().await;
        let hub = Entity::new("Hub Ventures", EntityType::Investor);
        repo.save_entity(&hub).await.unwrap();
        for i in 0..(MAX_CONTEXT_TRIPLES + 20) {
            let company = Entity::new(format!("Portfolio {}", i), EntityType::Company);
            repo.save_entity(&company).await.unwrap();
            repo.save_relationship(&Relationship::new(&hub.id, &company.id, RelationshipType::InvestsIn))
                .await
                .unwrap();
        }

        let context = expand_graph_context(&repo, &[hub.id.clone()], 1).await.unwrap();
        assert_eq!(context.triples.len(), MAX_CONTEXT_TRIPLES);
    }
}
