//! Entity deduplication
//!
//! Pairwise fuzzy matching on normalized names, and merges that fold a
//! duplicate into its canonical survivor without ever creating a duplicate
//! edge.

mod resolver;

pub use resolver::{DuplicatePair, EntityLockTable, EntityResolver, MergeOutcome, MergeReport};
