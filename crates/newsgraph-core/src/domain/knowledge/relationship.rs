//! Relationships between news entities
//!
//! Relationships are directed, typed edges. The store keeps at most one edge
//! per `(source_id, target_id, relationship_type)`; re-observing an edge
//! averages its strength and appends its description.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Upper bound of the strength scale
pub const MAX_STRENGTH: f64 = 10.0;

/// Strength given to an edge before it is scored
pub const DEFAULT_STRENGTH: f64 = 5.0;

/// Provenance-style edge type that is never stored as a relationship
const FORBIDDEN_TYPE: &str = "MENTIONED_IN";

/// A directed, typed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier for the relationship
    pub id: String,
    /// ID of the source entity
    pub source_id: String,
    /// ID of the target entity
    pub target_id: String,
    /// Type of relationship
    pub relationship_type: RelationshipType,
    /// Free text, concatenated across observations with `" | "`
    pub description: String,
    /// Strength on the 0-10 scale, rewritten by each scoring pass
    pub strength: f64,
    /// Strength as extracted, averaged across observations; scoring reads
    /// this, never its own previous output
    pub base_strength: f64,
    /// Number of times the edge has been observed
    pub observation_count: u64,
    /// Article the edge was first extracted from
    pub source_article_id: Option<String>,
    /// When the relationship was created
    pub created_at: DateTime<Utc>,
    /// When the relationship was last updated
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship between two entities
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            description: String::new(),
            strength: DEFAULT_STRENGTH,
            base_strength: DEFAULT_STRENGTH,
            observation_count: 1,
            source_article_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the extracted strength (clamped to 0-10)
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength.clamp(0.0, MAX_STRENGTH);
        self.base_strength = self.strength;
        self
    }

    /// Set the source article
    pub fn with_source_article(mut self, article_id: impl Into<String>) -> Self {
        self.source_article_id = Some(article_id.into());
        self
    }

    /// The uniqueness key of this edge
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            relationship_type: self.relationship_type,
        }
    }

    /// Validate the record before it is written
    pub fn validate(&self) -> Result<()> {
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return Err(Error::InvalidRecord(
                "relationship endpoints must be set".to_string(),
            ));
        }
        if self.source_id == self.target_id {
            return Err(Error::InvalidRecord(format!(
                "self-loop on entity '{}'",
                self.source_id
            )));
        }
        validate_strength(self.strength)?;
        validate_strength(self.base_strength)
    }
}

/// Reject strengths outside the 0-10 scale
pub fn validate_strength(strength: f64) -> Result<()> {
    if strength.is_finite() && (0.0..=MAX_STRENGTH).contains(&strength) {
        Ok(())
    } else {
        Err(Error::StrengthOutOfRange(strength))
    }
}

/// Uniqueness key `(source_id, target_id, relationship_type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
}

/// Types of relationships between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Company funded by an investor
    FundedBy,
    /// Company founded by a person
    FoundedBy,
    /// Person works at a company
    WorksAt,
    /// Company acquired another company
    Acquired,
    PartnersWith,
    CompetesWith,
    UsesTechnology,
    LocatedIn,
    /// Entity announced at an event
    AnnouncedAt,
    Regulates,
    Opposes,
    Supports,
    CollaboratesWith,
    /// Investor invests in a company
    InvestsIn,
    Advises,
    Leads,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FundedBy => "FUNDED_BY",
            Self::FoundedBy => "FOUNDED_BY",
            Self::WorksAt => "WORKS_AT",
            Self::Acquired => "ACQUIRED",
            Self::PartnersWith => "PARTNERS_WITH",
            Self::CompetesWith => "COMPETES_WITH",
            Self::UsesTechnology => "USES_TECHNOLOGY",
            Self::LocatedIn => "LOCATED_IN",
            Self::AnnouncedAt => "ANNOUNCED_AT",
            Self::Regulates => "REGULATES",
            Self::Opposes => "OPPOSES",
            Self::Supports => "SUPPORTS",
            Self::CollaboratesWith => "COLLABORATES_WITH",
            Self::InvestsIn => "INVESTS_IN",
            Self::Advises => "ADVISES",
            Self::Leads => "LEADS",
        }
    }

    /// Parse from string, accepting any case and spaces for underscores
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase().replace([' ', '-'], "_");
        Self::all().iter().copied().find(|t| t.as_str() == upper)
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::FundedBy,
            Self::FoundedBy,
            Self::WorksAt,
            Self::Acquired,
            Self::PartnersWith,
            Self::CompetesWith,
            Self::UsesTechnology,
            Self::LocatedIn,
            Self::AnnouncedAt,
            Self::Regulates,
            Self::Opposes,
            Self::Supports,
            Self::CollaboratesWith,
            Self::InvestsIn,
            Self::Advises,
            Self::Leads,
        ]
    }

    /// Whether edges of this type take part in community projection
    ///
    /// Event-announcement edges behave like provenance and are left out.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::AnnouncedAt)
    }

    /// Relationship types included in community projection
    pub fn structural() -> Vec<RelationshipType> {
        Self::all()
            .iter()
            .copied()
            .filter(|t| t.is_structural())
            .collect()
    }

    /// Edge types whose context score gets a bonus
    pub fn is_high_signal(&self) -> bool {
        matches!(self, Self::Acquired | Self::FundedBy | Self::FoundedBy)
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            let normalized = s.trim().to_uppercase();
            if normalized == FORBIDDEN_TYPE {
                Error::InvalidRelationshipType(format!(
                    "{} is provenance, record it as a source article instead",
                    FORBIDDEN_TYPE
                ))
            } else {
                Error::InvalidRelationshipType(s.to_string())
            }
        })
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new("a", "b", RelationshipType::FundedBy)
            .with_description("Led the Series A")
            .with_strength(12.0)
            .with_source_article("art-1");

        assert_eq!(rel.strength, MAX_STRENGTH);
        assert_eq!(rel.source_article_id.as_deref(), Some("art-1"));
        assert!(rel.validate().is_ok());
    }

    #[test]
    fn test_relationship_type_parse() {
        assert_eq!(RelationshipType::parse("FUNDED_BY"), Some(RelationshipType::FundedBy));
        assert_eq!(RelationshipType::parse("funded by"), Some(RelationshipType::FundedBy));
        assert_eq!(
            RelationshipType::parse("uses-technology"),
            Some(RelationshipType::UsesTechnology)
        );
        assert_eq!(RelationshipType::parse("RELATED_TO"), None);
        assert_eq!(RelationshipType::all().len(), 16);
    }

    #[test]
    fn test_mentioned_in_is_rejected() {
        assert_eq!(RelationshipType::parse("MENTIONED_IN"), None);
        let err = "MENTIONED_IN".parse::<RelationshipType>().unwrap_err();
        assert_eq!(err.code(), "E801");
    }

    #[test]
    fn test_structural_whitelist() {
        let structural = RelationshipType::structural();
        assert_eq!(structural.len(), 15);
        assert!(!structural.contains(&RelationshipType::AnnouncedAt));
        assert!(structural.contains(&RelationshipType::CompetesWith));
    }

    #[test]
    fn test_validate_rejects_bad_edges() {
        let self_loop = Relationship::new("a", "a", RelationshipType::PartnersWith);
        assert!(self_loop.validate().is_err());

        let mut out_of_range = Relationship::new("a", "b", RelationshipType::PartnersWith);
        out_of_range.strength = -1.0;
        assert!(matches!(
            out_of_range.validate(),
            Err(Error::StrengthOutOfRange(_))
        ));

        assert!(validate_strength(f64::NAN).is_err());
        assert!(validate_strength(10.0).is_ok());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RelationshipType::UsesTechnology).unwrap();
        assert_eq!(json, "\"USES_TECHNOLOGY\"");
    }
}
