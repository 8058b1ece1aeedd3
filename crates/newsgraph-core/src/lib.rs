//! Newsgraph Core Library
//!
//! The intelligence layer of a news knowledge graph:
//! - Name normalization and entity deduplication
//! - Relationship strength scoring
//! - Three-tier community detection
//! - Entity embeddings behind a lazily loaded backend
//! - Hybrid retrieval: intent routing, graph profiles, semantic and keyword
//!   search, graph-context expansion and document fusion
//! - Storage (SQLite with versioned migrations)

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod intelligence;
pub mod logging;
pub mod storage;


pub use error::{Error, Result};
pub use intelligence::{IntelligenceLayer, MaintenanceReport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::knowledge::{Entity, EntityType, Relationship, RelationshipType};
    pub use crate::domain::retrieval::{QueryPayload, QueryResponse, RetrievalMode};
    pub use crate::error::{Error, Result};
    pub use crate::intelligence::IntelligenceLayer;
}
