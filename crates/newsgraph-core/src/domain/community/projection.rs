//! Undirected projection of the entity graph used by community detection

use std::collections::HashMap;

use crate::domain::knowledge::{GraphRepository, Relationship};
use crate::error::Result;

/// Weighted undirected graph over entity ids
///
/// Nodes are indexed densely in the order they were added. Parallel edges
/// between the same pair accumulate weight; self-loops are dropped.
#[derive(Debug, Clone, Default)]
pub struct GraphProjection {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Vec<HashMap<usize, f64>>,
    edge_count: usize,
}

impl GraphProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project every entity and every structural relationship from the store
    pub async fn load<R: GraphRepository + ?Sized>(repository: &R) -> Result<Self> {
        let mut projection = Self::new();
        for entity in repository.list_entities(None).await? {
            projection.add_node(&entity.id);
        }
        for relationship in repository.list_relationships(None).await? {
            projection.add_relationship(&relationship);
        }
        Ok(projection)
    }

    /// Add a node, returning its index
    pub fn add_node(&mut self, entity_id: &str) -> usize {
        if let Some(&idx) = self.index.get(entity_id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(entity_id.to_string());
        self.index.insert(entity_id.to_string(), idx);
        self.adjacency.push(HashMap::new());
        idx
    }

    /// Add an undirected edge of weight 1 between two known nodes
    ///
    /// Returns false when either end is unknown or the edge is a self-loop.
    pub fn add_edge(&mut self, a: &str, b: &str) -> bool {
        let (Some(&i), Some(&j)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        if i == j {
            return false;
        }
        *self.adjacency[i].entry(j).or_default() += 1.0;
        *self.adjacency[j].entry(i).or_default() += 1.0;
        self.edge_count += 1;
        true
    }

    /// Add a relationship if its type is structural
    pub fn add_relationship(&mut self, relationship: &Relationship) -> bool {
        if !relationship.relationship_type.is_structural() {
            return false;
        }
        self.add_edge(&relationship.source_id, &relationship.target_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges added, counting parallel edges
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn node_id(&self, idx: usize) -> Option<&str> {
        self.nodes.get(idx).map(String::as_str)
    }

    pub fn node_index(&self, entity_id: &str) -> Option<usize> {
        self.index.get(entity_id).copied()
    }

    /// Neighbours of a node with accumulated edge weights
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency
            .get(idx)
            .into_iter()
            .flat_map(|m| m.iter().map(|(&j, &w)| (j, w)))
    }

    /// Each distinct undirected pair once, as `(low, high, weight)`
    pub fn edges(&self) -> Vec<(usize, usize, f64)> {
        let mut edges: Vec<(usize, usize, f64)> = self
            .adjacency
            .iter()
            .enumerate()
            .flat_map(|(i, m)| {
                m.iter()
                    .filter(move |(j, _)| i < **j)
                    .map(move |(&j, &w)| (i, j, w))
            })
            .collect();
        edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        edges
    }

    /// Turn a label-per-node partition into groups of entity ids
    ///
    /// Groups are ordered by first appearance, members by node index.
    pub fn groups(&self, labels: &[usize]) -> Vec<Vec<String>> {
        let mut order: Vec<usize> = Vec::new();
        let mut members: HashMap<usize, Vec<String>> = HashMap::new();
        for (idx, &label) in labels.iter().enumerate().take(self.nodes.len()) {
            members
                .entry(label)
                .or_insert_with(|| {
                    order.push(label);
                    Vec::new()
                })
                .push(self.nodes[idx].clone());
        }
        order
            .into_iter()
            .filter_map(|label| members.remove(&label))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::RelationshipType;

    #[test]
    fn test_edges_are_undirected_and_accumulate() {
        let mut projection = GraphProjection::new();
        projection.add_node("a");
        projection.add_node("b");
        assert_eq!(projection.add_node("a"), 0);

        assert!(projection.add_edge("a", "b"));
        assert!(projection.add_edge("b", "a"));
        assert!(!projection.add_edge("a", "a"));
        assert!(!projection.add_edge("a", "missing"));

        assert_eq!(projection.edge_count(), 2);
        assert_eq!(projection.edges(), vec![(0, 1, 2.0)]);
        assert_eq!(projection.neighbors(1).collect::<Vec<_>>(), vec![(0, 2.0)]);
    }

    #[test]
    fn test_announcement_edges_are_skipped() {
        let mut projection = GraphProjection::new();
        projection.add_node("company");
        projection.add_node("event");

        let announced = Relationship::new("company", "event", RelationshipType::AnnouncedAt);
        assert!(!projection.add_relationship(&announced));
        let partners = Relationship::new("company", "event", RelationshipType::PartnersWith);
        assert!(projection.add_relationship(&partners));
        assert_eq!(projection.edge_count(), 1);
    }

    #[test]
    fn test_groups() {
        let mut projection = GraphProjection::new();
        for id in ["a", "b", "c", "d"] {
            projection.add_node(id);
        }
        let groups = projection.groups(&[7, 3, 7, 3]);
        assert_eq!(groups, vec![vec!["a", "c"], vec!["b", "d"]]);
    }
}
