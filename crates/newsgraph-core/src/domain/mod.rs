//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod community;
pub mod embedding;
pub mod knowledge;
pub mod resolution;
pub mod retrieval;
pub mod scoring;
