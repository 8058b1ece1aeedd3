//! Intent routing and graph-profile templates
//!
//! Profiles are static tables of `(section, relationship type, direction)`
//! rows keyed by [`GraphProfile`]. Relationship types are enum values bound
//! as query parameters, so no caller text ever shapes a query.

use serde::{Deserialize, Serialize};

use super::intent::{extract_subject, Classification, Intent, QueryFilters};
use crate::domain::knowledge::{EntityType, RelationshipType, TraversalDirection};

use crate::domain::knowledge::RelationshipType as Rt;
use crate::domain::knowledge::TraversalDirection::{Both, Incoming, Outgoing};

/// Kinds of single-entity profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphProfile {
    Company,
    Investor,
    Person,
    Technology,
}

/// One row of a profile template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSection {
    pub label: &'static str,
    pub relationship_type: RelationshipType,
    pub direction: TraversalDirection,
}

const fn section(
    label: &'static str,
    relationship_type: RelationshipType,
    direction: TraversalDirection,
) -> ProfileSection {
    ProfileSection {
        label,
        relationship_type,
        direction,
    }
}

const COMPANY_PROFILE: &[ProfileSection] = &[
    section("investors", Rt::FundedBy, Outgoing),
    section("investors", Rt::InvestsIn, Incoming),
    section("founders", Rt::FoundedBy, Outgoing),
    section("leaders", Rt::Leads, Incoming),
    section("people", Rt::WorksAt, Incoming),
    section("technologies", Rt::UsesTechnology, Outgoing),
    section("partners", Rt::PartnersWith, Both),
    section("partners", Rt::CollaboratesWith, Both),
    section("locations", Rt::LocatedIn, Outgoing),
    section("competitors", Rt::CompetesWith, Both),
    section("acquisitions", Rt::Acquired, Outgoing),
    section("acquired_by", Rt::Acquired, Incoming),
];

const INVESTOR_PROFILE: &[ProfileSection] = &[
    section("portfolio", Rt::InvestsIn, Outgoing),
    section("portfolio", Rt::FundedBy, Incoming),
    section("people", Rt::WorksAt, Incoming),
    section("locations", Rt::LocatedIn, Outgoing),
    section("co_investors", Rt::CollaboratesWith, Both),
];

const PERSON_PROFILE: &[ProfileSection] = &[
    section("works_at", Rt::WorksAt, Outgoing),
    section("founded", Rt::FoundedBy, Incoming),
    section("leads", Rt::Leads, Outgoing),
    section("advises", Rt::Advises, Outgoing),
    section("investments", Rt::InvestsIn, Outgoing),
    section("locations", Rt::LocatedIn, Outgoing),
];

const TECHNOLOGY_PROFILE: &[ProfileSection] = &[
    section("used_by", Rt::UsesTechnology, Incoming),
    section("competitors", Rt::CompetesWith, Both),
    section("related", Rt::CollaboratesWith, Both),
    section("regulated_by", Rt::Regulates, Incoming),
];

impl GraphProfile {
    /// The template rows of this profile
    pub fn template(&self) -> &'static [ProfileSection] {
        match self {
            Self::Company => COMPANY_PROFILE,
            Self::Investor => INVESTOR_PROFILE,
            Self::Person => PERSON_PROFILE,
            Self::Technology => TECHNOLOGY_PROFILE,
        }
    }

    /// Entity type looked up first when resolving the subject
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Company => EntityType::Company,
            Self::Investor => EntityType::Investor,
            Self::Person => EntityType::Person,
            Self::Technology => EntityType::Technology,
        }
    }

    /// Profile that best describes an entity of the given type
    pub fn for_entity_type(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Investor => Self::Investor,
            EntityType::Person => Self::Person,
            EntityType::Technology => Self::Technology,
            _ => Self::Company,
        }
    }
}

/// Where a classified question goes
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Single-entity profile of the named subject
    Profile { profile: GraphProfile, subject: String },
    /// Companies in a sector, optionally only funded ones
    SectorListing { filters: QueryFilters, funded_only: bool },
    /// Graph-wide statistics and strongest relationships
    Insights { topic: Option<String> },
    /// Seed entities, expanded context and connecting paths
    MultiHop,
    /// Hybrid entity search plus fused document retrieval
    HybridSearch,
}

/// Map a classification to a route
///
/// Profile routes need a subject; without one they become hybrid search.
pub fn route(classification: &Classification, question: &str) -> Route {
    let profile = |profile: GraphProfile| match extract_subject(question) {
        Some(subject) => Route::Profile { profile, subject },
        None => Route::HybridSearch,
    };

    match classification.intent {
        Intent::ListFundedCompanies => Route::SectorListing {
            filters: classification.filters.clone().unwrap_or_default(),
            funded_only: true,
        },
        Intent::ListCompaniesInSector => Route::SectorListing {
            filters: classification.filters.clone().unwrap_or_default(),
            funded_only: false,
        },
        Intent::FundingInfo
        | Intent::CompanyInfo
        | Intent::CompanyLeadership
        | Intent::CompetitiveAnalysis => profile(GraphProfile::Company),
        Intent::InvestorInfo => profile(GraphProfile::Investor),
        Intent::PersonInfo => profile(GraphProfile::Person),
        Intent::TechnologyInfo => profile(GraphProfile::Technology),
        Intent::TrendAnalysis => Route::Insights {
            topic: extract_subject(question),
        },
        Intent::RelationshipQuery => Route::MultiHop,
        Intent::GeneralSearch => Route::HybridSearch,
    }
}
