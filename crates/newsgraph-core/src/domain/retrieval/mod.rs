//! Question answering over the knowledge graph
//!
//! - **Intent**: rule-based classification of a question
//! - **Router**: intent to profile template, sector listing, insights,
//!   multi-hop or hybrid search
//! - **Search**: semantic and keyword entity search merged into one ranking
//! - **Context and fusion**: graph neighbourhoods and vector hits merged into
//!   one document list
//! - **Answer**: prompt assembly and fallback text for a generation provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newsgraph_core::domain::retrieval::{HybridRetrievalEngine, QueryPayload};
//!
//! let engine = HybridRetrievalEngine::new(graph, documents, client)
//!     .with_settings(config.retrieval.clone());
//! let response = engine.query("Which AI startups raised funding recently?").await?;
//! if let QueryPayload::SectorListing(listing) = &response.payload {
//!     for company in &listing.companies {
//!         println!("{}: {}", company.entity.name, company.investors.join(", "));
//!     }
//! }
//! ```

mod answer;
mod context;
mod engine;
mod fusion;
mod intent;
mod router;
mod search;

pub use answer::{
    build_prompt, fallback_answer, render_context, Answer, AnswerGenerator, AnswerSynthesizer,
};
pub use context::{
    expand_graph_context, GraphContext, RelationshipTriple, MAX_CONTEXT_ARTICLES,
    MAX_CONTEXT_TRIPLES,
};
pub use engine::{
    CommunityOverview, Comparison, ConnectingPath, ConnectingStep, EntityProfile, GraphInsights,
    HybridRetrievalEngine, ListedCompany, MultiHopResult, ProfileGroup, QueryPayload,
    QueryResponse, RetrievalMode, SearchPayload, SectorListing, SeedEntity, MAX_LISTED_COMPANIES,
    MAX_SEEDS, RECENT_WINDOW_DAYS,
};
pub use fusion::{fuse_documents, DocumentOrigin, FusedDocument, GraphDocument};
pub use intent::{
    classify, extract_names, extract_subject, Classification, Intent, QueryFilters, SECTORS,
};
pub use router::{route, GraphProfile, ProfileSection, Route};
pub use search::{merge_hybrid, HybridHit, MatchSource};
