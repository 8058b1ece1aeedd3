//! Entity types for the news knowledge graph
//!
//! Entities are the nodes of the graph: companies, people, investors and the
//! other things news articles talk about. An entity's id is derived from its
//! type and normalized name, so re-observing the same name upserts instead of
//! creating a duplicate.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalizer::{entity_id, normalize};
use crate::error::{Error, Result};

/// Separator used when descriptions are concatenated
pub const DESCRIPTION_SEPARATOR: &str = " | ";

/// Maximum number of entries in [`CompanyEnrichment::extra`]
pub const MAX_EXTRA_PROPERTIES: usize = 32;

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic id, see [`entity_id`]
    pub id: String,
    /// Display name, as first observed or as chosen by a merge
    pub name: String,
    /// Type of entity
    pub entity_type: EntityType,
    /// Normalized name used for lookups and deduplication
    pub normalized_name: String,
    /// Free text, concatenated across mentions with `" | "`
    pub description: String,
    /// Number of times the entity has been observed
    pub mention_count: u64,
    /// Articles the entity was extracted from, in first-seen order
    pub source_article_ids: Vec<String>,
    /// Community label from the last detection pass
    pub community_id: Option<i64>,
    /// Enrichment record, only ever set on companies
    pub enrichment: Option<CompanyEnrichment>,
    /// When the entity was created
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity from its first observation
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into().trim().to_string();
        let now = Utc::now();

        Self {
            id: entity_id(entity_type, &name),
            normalized_name: normalize(&name),
            name,
            entity_type,
            description: String::new(),
            mention_count: 1,
            source_article_ids: Vec::new(),
            community_id: None,
            enrichment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the mention count
    pub fn with_mention_count(mut self, mention_count: u64) -> Self {
        self.mention_count = mention_count;
        self
    }

    /// Add a source article
    pub fn with_source_article(mut self, article_id: impl Into<String>) -> Self {
        self.add_source_article(article_id.into());
        self
    }

    /// Attach an enrichment record
    pub fn with_enrichment(mut self, enrichment: CompanyEnrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    /// Add a source article id, keeping first-seen order
    pub fn add_source_article(&mut self, article_id: String) {
        if !article_id.is_empty() && !self.source_article_ids.contains(&article_id) {
            self.source_article_ids.push(article_id);
            self.updated_at = Utc::now();
        }
    }

    /// Append a description fragment unless it is already present
    pub fn append_description(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if self.description.is_empty() {
            self.description = fragment.to_string();
        } else if !self
            .description
            .split(DESCRIPTION_SEPARATOR)
            .any(|existing| existing == fragment)
        {
            self.description.push_str(DESCRIPTION_SEPARATOR);
            self.description.push_str(fragment);
        }
        self.updated_at = Utc::now();
    }

    /// Fold another observation of this entity into it
    pub fn observe(&mut self, description: &str, article_id: Option<&str>) {
        self.mention_count += 1;
        self.append_description(description);
        if let Some(article_id) = article_id {
            self.add_source_article(article_id.to_string());
        }
        self.updated_at = Utc::now();
    }

    /// Absorb a merged-away duplicate into this entity
    ///
    /// Unions description and provenance and sums mention counts. Enrichment
    /// from the other entity is kept only when this one is a company with none.
    pub fn absorb(&mut self, other: &Entity) {
        for fragment in other.description.split(DESCRIPTION_SEPARATOR) {
            self.append_description(fragment);
        }
        for article_id in &other.source_article_ids {
            self.add_source_article(article_id.clone());
        }
        self.mention_count += other.mention_count;
        if self.entity_type == EntityType::Company && self.enrichment.is_none() {
            self.enrichment = other.enrichment.clone();
        }
        self.updated_at = Utc::now();
    }

    /// Rename the entity, keeping its id stable
    pub fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.normalized_name = normalize(&self.name);
        self.updated_at = Utc::now();
    }

    /// Validate the record before it is written
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRecord("entity name is empty".to_string()));
        }
        if self.normalized_name.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "entity name '{}' normalizes to nothing",
                self.name
            )));
        }
        if let Some(enrichment) = &self.enrichment {
            if self.entity_type != EntityType::Company {
                return Err(Error::InvalidRecord(format!(
                    "enrichment is only allowed on companies, not {}",
                    self.entity_type
                )));
            }
            enrichment.validate()?;
        }
        Ok(())
    }
}

/// Types of entities extracted from news
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Company,
    Person,
    Investor,
    Technology,
    Product,
    FundingRound,
    Location,
    Event,
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "Company",
            Self::Person => "Person",
            Self::Investor => "Investor",
            Self::Technology => "Technology",
            Self::Product => "Product",
            Self::FundingRound => "FundingRound",
            Self::Location => "Location",
            Self::Event => "Event",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "company" => Some(Self::Company),
            "person" => Some(Self::Person),
            "investor" => Some(Self::Investor),
            "technology" | "tech" => Some(Self::Technology),
            "product" => Some(Self::Product),
            "fundinground" | "funding_round" | "funding round" => Some(Self::FundingRound),
            "location" => Some(Self::Location),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    /// Get all entity types
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Company,
            Self::Person,
            Self::Investor,
            Self::Technology,
            Self::Product,
            Self::FundingRound,
            Self::Location,
            Self::Event,
        ]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Enrichment lifecycle of a company
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    #[default]
    Pending,
    Enriched,
}

/// Typed enrichment record for companies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyEnrichment {
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub founders: Vec<String>,
    pub products: Vec<String>,
    pub technologies: Vec<String>,
    pub funding_total: Option<String>,
    pub funding_stage: Option<String>,
    pub pricing_model: Option<String>,
    pub website_url: Option<String>,
    pub employee_count: Option<String>,
    pub enrichment_status: EnrichmentStatus,
    /// Confidence in the enrichment, 0.0 to 1.0
    pub enrichment_confidence: f32,
    /// Forward-compatible properties, bounded by [`MAX_EXTRA_PROPERTIES`]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CompanyEnrichment {
    /// Create a pending enrichment record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.enrichment_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Mark the record enriched
    pub fn enriched(mut self) -> Self {
        self.enrichment_status = EnrichmentStatus::Enriched;
        self
    }

    /// Insert an extra property
    ///
    /// Existing keys are overwritten; new keys are rejected once the map is full.
    pub fn insert_extra(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let key = key.into();
        if !self.extra.contains_key(&key) && self.extra.len() >= MAX_EXTRA_PROPERTIES {
            return Err(Error::InvalidRecord(format!(
                "enrichment extra map is full ({} entries), cannot add '{}'",
                MAX_EXTRA_PROPERTIES, key
            )));
        }
        self.extra.insert(key, value);
        Ok(())
    }

    /// Check bounds on a record that may have come from deserialization
    pub fn validate(&self) -> Result<()> {
        if self.extra.len() > MAX_EXTRA_PROPERTIES {
            return Err(Error::InvalidRecord(format!(
                "enrichment has {} extra properties, at most {} allowed",
                self.extra.len(),
                MAX_EXTRA_PROPERTIES
            )));
        }
        if !(0.0..=1.0).contains(&self.enrichment_confidence) {
            return Err(Error::InvalidRecord(format!(
                "enrichment confidence {} is outside 0-1",
                self.enrichment_confidence
            )));
        }
        Ok(())
    }

    /// Overlay the set fields of `other` onto this record
    pub fn merge_from(&mut self, other: &CompanyEnrichment) -> Result<()> {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        fn extend(dst: &mut Vec<String>, src: &[String]) {
            for item in src {
                if !dst.contains(item) {
                    dst.push(item.clone());
                }
            }
        }

        take(&mut self.headquarters, &other.headquarters);
        if other.founded_year.is_some() {
            self.founded_year = other.founded_year;
        }
        extend(&mut self.founders, &other.founders);
        extend(&mut self.products, &other.products);
        extend(&mut self.technologies, &other.technologies);
        take(&mut self.funding_total, &other.funding_total);
        take(&mut self.funding_stage, &other.funding_stage);
        take(&mut self.pricing_model, &other.pricing_model);
        take(&mut self.website_url, &other.website_url);
        take(&mut self.employee_count, &other.employee_count);
        if other.enrichment_status == EnrichmentStatus::Enriched {
            self.enrichment_status = EnrichmentStatus::Enriched;
        }
        self.enrichment_confidence = self.enrichment_confidence.max(other.enrichment_confidence);
        for (key, value) in &other.extra {
            self.insert_extra(key.clone(), value.clone())?;
        }
        Ok(())
    }

    /// One-line summary used in embedding text
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(hq) = &self.headquarters {
            parts.push(format!("Located in {}", hq));
        }
        if let Some(year) = self.founded_year {
            parts.push(format!("Founded in {}", year));
        }
        if !self.founders.is_empty() {
            parts.push(format!("Founders: {}", self.founders.join(", ")));
        }
        if !self.products.is_empty() {
            parts.push(format!("Products: {}", self.products.join(", ")));
        }
        if !self.technologies.is_empty() {
            parts.push(format!("Technologies: {}", self.technologies.join(", ")));
        }
        match (&self.funding_total, &self.funding_stage) {
            (Some(total), Some(stage)) => parts.push(format!("Funding: {} ({})", total, stage)),
            (Some(total), None) => parts.push(format!("Funding: {}", total)),
            (None, Some(stage)) => parts.push(format!("Funding stage: {}", stage)),
            (None, None) => {}
        }
        if let Some(employees) = &self.employee_count {
            parts.push(format!("Employees: {}", employees));
        }
        if let Some(pricing) = &self.pricing_model {
            parts.push(format!("Pricing: {}", pricing));
        }
        for (key, value) in &self.extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            parts.push(format!("{}: {}", key, value));
        }
        parts.join(". ")
    }
}
