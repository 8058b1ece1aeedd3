//! Community detection over the entity graph
//!
//! A [`CommunityDetector`] runs an ordered chain of [`CommunityAlgorithm`]
//! tiers (remote analytics, then the in-process algorithms) and ends with
//! bounded-BFS connected components when every tier fails.

mod detector;
mod local;
mod projection;

pub use detector::{
    BfsComponents, CommunityAlgorithm, CommunityDetector, CommunityReport, CommunitySummary,
    Detection, RelatedCommunity,
};
pub use local::{
    label_propagation, leiden, louvain, modularity, LocalAlgorithm, LocalCommunityAlgorithms,
};
pub use projection::GraphProjection;
