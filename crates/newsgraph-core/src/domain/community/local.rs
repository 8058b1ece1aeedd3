//! In-process community algorithms
//!
//! Leiden, Louvain and label propagation over a [`GraphProjection`]. All
//! three visit nodes in an order drawn from a seeded ChaCha RNG, so a given
//! seed and projection always yield the same partition.
//!
//! The Leiden variant here is Louvain with a connectivity refinement: after
//! each local-moving phase every community is split into its connected
//! components before aggregation, so no community is ever disconnected.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::detector::{CommunityAlgorithm, Detection};
use super::projection::GraphProjection;
use crate::error::{Error, Result};

const GAIN_EPSILON: f64 = 1e-12;
const MAX_LEVELS: usize = 32;
const MAX_SWEEPS: usize = 100;

/// One of the local algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAlgorithm {
    Leiden,
    Louvain,
    LabelPropagation,
}

impl LocalAlgorithm {
    /// Order in which the local tier tries them
    pub const ALL: [LocalAlgorithm; 3] = [Self::Leiden, Self::Louvain, Self::LabelPropagation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leiden => "leiden",
            Self::Louvain => "louvain",
            Self::LabelPropagation => "label_propagation",
        }
    }
}

/// Weighted graph that can be aggregated level by level
#[derive(Debug, Clone)]
struct WorkingGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    degrees: Vec<f64>,
    /// Sum of all degrees (2m)
    total_degree: f64,
}

impl WorkingGraph {
    fn from_projection(projection: &GraphProjection) -> Self {
        let adjacency: Vec<Vec<(usize, f64)>> = (0..projection.node_count())
            .map(|i| {
                let mut neighbors: Vec<(usize, f64)> = projection.neighbors(i).collect();
                neighbors.sort_by_key(|(j, _)| *j);
                neighbors
            })
            .collect();
        let degrees: Vec<f64> = adjacency
            .iter()
            .map(|n| n.iter().map(|(_, w)| w).sum())
            .collect();
        let total_degree = degrees.iter().sum();

        Self {
            adjacency,
            degrees,
            total_degree,
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Collapse each community into one node
    ///
    /// Internal weight becomes part of the node's degree only, since a
    /// self-loop never changes which community a node prefers.
    fn aggregate(&self, labels: &[usize], communities: usize) -> Self {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); communities];
        let mut degrees = vec![0.0; communities];

        for (i, neighbors) in self.adjacency.iter().enumerate() {
            let ci = labels[i];
            degrees[ci] += self.degrees[i];
            for &(j, w) in neighbors {
                let cj = labels[j];
                if ci != cj {
                    *links[ci].entry(cj).or_default() += w;
                }
            }
        }

        Self {
            adjacency: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            degrees,
            total_degree: self.total_degree,
        }
    }

    /// Move nodes greedily between communities until no move improves modularity
    ///
    /// Returns the labels and whether any node moved.
    fn local_moving(&self, rng: &mut ChaCha8Rng, resolution: f64) -> (Vec<usize>, bool) {
        let n = self.len();
        let mut labels: Vec<usize> = (0..n).collect();
        let mut community_totals = self.degrees.clone();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut moved = false;
        for _ in 0..MAX_SWEEPS {
            let mut changed = false;

            for &node in &order {
                let current = labels[node];
                let k = self.degrees[node];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &self.adjacency[node] {
                    *links.entry(labels[j]).or_default() += w;
                }

                community_totals[current] -= k;
                let gain = |community: usize, weight: f64| {
                    weight - resolution * k * community_totals[community] / self.total_degree
                };

                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&community, &weight) in &links {
                    let candidate = gain(community, weight);
                    if candidate > best_gain + GAIN_EPSILON {
                        best = community;
                        best_gain = candidate;
                    }
                }
                community_totals[best] += k;

                if best != current {
                    labels[node] = best;
                    changed = true;
                    moved = true;
                }
            }

            if !changed {
                break;
            }
        }

        (labels, moved)
    }

    /// Split every community into its connected components
    fn refine(&self, labels: &[usize]) -> Vec<usize> {
        let n = self.len();
        let mut refined = vec![usize::MAX; n];
        let mut next = 0;

        for start in 0..n {
            if refined[start] != usize::MAX {
                continue;
            }
            refined[start] = next;
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for &(j, _) in &self.adjacency[node] {
                    if refined[j] == usize::MAX && labels[j] == labels[start] {
                        refined[j] = next;
                        queue.push_back(j);
                    }
                }
            }
            next += 1;
        }

        refined
    }
}

/// Relabel to 0..k in order of first appearance; returns k
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let renumbered = labels
        .iter()
        .map(|&label| {
            let next = mapping.len();
            *mapping.entry(label).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

/// Newman modularity of a partition
pub fn modularity(projection: &GraphProjection, labels: &[usize], resolution: f64) -> f64 {
    let graph = WorkingGraph::from_projection(projection);
    if graph.total_degree == 0.0 {
        return 0.0;
    }

    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut totals: HashMap<usize, f64> = HashMap::new();
    for (i, neighbors) in graph.adjacency.iter().enumerate() {
        *totals.entry(labels[i]).or_default() += graph.degrees[i];
        for &(j, w) in neighbors {
            if labels[i] == labels[j] {
                *internal.entry(labels[i]).or_default() += w;
            }
        }
    }

    let m2 = graph.total_degree;
    totals
        .iter()
        .map(|(c, total)| {
            internal.get(c).copied().unwrap_or(0.0) / m2 - resolution * (total / m2).powi(2)
        })
        .sum()
}

fn louvain_levels(projection: &GraphProjection, rng: &mut ChaCha8Rng, resolution: f64, refine: bool) -> Vec<usize> {
    let mut graph = WorkingGraph::from_projection(projection);
    let mut membership: Vec<usize> = (0..graph.len()).collect();
    if graph.total_degree == 0.0 {
        return membership;
    }

    for level in 0..MAX_LEVELS {
        let (labels, moved) = graph.local_moving(rng, resolution);
        let labels = if refine { graph.refine(&labels) } else { labels };
        let (labels, communities) = renumber(&labels);

        membership = membership.iter().map(|&m| labels[m]).collect();
        debug!(level, nodes = graph.len(), communities, "Community level finished");

        if !moved || communities == graph.len() {
            break;
        }
        graph = graph.aggregate(&labels, communities);
    }

    membership
}

/// Louvain modularity optimisation
pub fn louvain(projection: &GraphProjection, seed: u64, resolution: f64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    louvain_levels(projection, &mut rng, resolution, false)
}

/// Louvain with connectivity refinement between levels
pub fn leiden(projection: &GraphProjection, seed: u64, resolution: f64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    louvain_levels(projection, &mut rng, resolution, true)
}

/// Asynchronous label propagation
///
/// A node keeps its label when it is among the heaviest; otherwise it takes
/// the smallest of the heaviest labels. Fails when labels still change after
/// `max_iterations` sweeps.
pub fn label_propagation(projection: &GraphProjection, seed: u64, max_iterations: usize) -> Result<Vec<usize>> {
    let n = projection.node_count();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut labels: Vec<usize> = (0..n).collect();
    let mut order: Vec<usize> = (0..n).collect();

    for iteration in 0..max_iterations {
        order.shuffle(&mut rng);
        let mut changed = false;

        for &node in &order {
            let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
            for (j, w) in projection.neighbors(node) {
                *weights.entry(labels[j]).or_default() += w;
            }
            let Some(heaviest) = weights.values().copied().reduce(f64::max) else {
                continue;
            };
            if weights
                .get(&labels[node])
                .is_some_and(|w| *w >= heaviest - GAIN_EPSILON)
            {
                continue;
            }
            if let Some((&label, _)) = weights.iter().find(|(_, w)| **w >= heaviest - GAIN_EPSILON) {
                labels[node] = label;
                changed = true;
            }
        }

        if !changed {
            debug!(iterations = iteration + 1, "Label propagation converged");
            return Ok(renumber(&labels).0);
        }
    }

    Err(Error::CommunityDetectionFailed(format!(
        "label propagation did not converge after {} iterations",
        max_iterations
    )))
}

/// The local tier: Leiden, then Louvain, then label propagation
#[derive(Debug, Clone)]
pub struct LocalCommunityAlgorithms {
    seed: u64,
    resolution: f64,
    max_iterations: usize,
}

impl LocalCommunityAlgorithms {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            resolution: 1.0,
            max_iterations: MAX_SWEEPS,
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Run one algorithm
    pub fn run(&self, algorithm: LocalAlgorithm, projection: &GraphProjection) -> Result<Vec<usize>> {
        let labels = match algorithm {
            LocalAlgorithm::Leiden => leiden(projection, self.seed, self.resolution),
            LocalAlgorithm::Louvain => louvain(projection, self.seed, self.resolution),
            LocalAlgorithm::LabelPropagation => {
                label_propagation(projection, self.seed, self.max_iterations)?
            }
        };

        let quality = modularity(projection, &labels, self.resolution);
        if !quality.is_finite() {
            return Err(Error::CommunityDetectionFailed(format!(
                "{} produced a partition with undefined modularity",
                algorithm.as_str()
            )));
        }
        debug!(algorithm = algorithm.as_str(), modularity = quality, "Local partition computed");
        Ok(labels)
    }
}

#[async_trait]
impl CommunityAlgorithm for LocalCommunityAlgorithms {
    fn name(&self) -> &str {
        "local"
    }

    async fn detect(&self, projection: &GraphProjection) -> Result<Detection> {
        let mut last_error = None;
        for algorithm in LocalAlgorithm::ALL {
            match self.run(algorithm, projection) {
                Ok(labels) => {
                    return Ok(Detection {
                        algorithm: format!("local:{}", algorithm.as_str()),
                        groups: projection.groups(&labels),
                    });
                }
                Err(e) => {
                    warn!(algorithm = algorithm.as_str(), error = %e, "Local community algorithm failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::CommunityDetectionFailed("no local algorithm available".to_string())
        }))
    }
}
