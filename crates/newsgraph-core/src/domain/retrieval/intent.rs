//! Rule-based question intent classification
//!
//! Rules are evaluated in a fixed order and the first match wins: funding
//! questions, then company questions (including "about X"), then the
//! investor, person, technology, trend and relationship buckets. Anything
//! else is a general search.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a question is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ListFundedCompanies,
    FundingInfo,
    CompetitiveAnalysis,
    CompanyLeadership,
    ListCompaniesInSector,
    CompanyInfo,
    InvestorInfo,
    PersonInfo,
    TechnologyInfo,
    TrendAnalysis,
    RelationshipQuery,
    GeneralSearch,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListFundedCompanies => "list_funded_companies",
            Self::FundingInfo => "funding_info",
            Self::CompetitiveAnalysis => "competitive_analysis",
            Self::CompanyLeadership => "company_leadership",
            Self::ListCompaniesInSector => "list_companies_in_sector",
            Self::CompanyInfo => "company_info",
            Self::InvestorInfo => "investor_info",
            Self::PersonInfo => "person_info",
            Self::TechnologyInfo => "technology_info",
            Self::TrendAnalysis => "trend_analysis",
            Self::RelationshipQuery => "relationship_query",
            Self::GeneralSearch => "general_search",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filters extracted from list-style questions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Canonical sector name, e.g. `ai`
    pub sector: Option<String>,
    /// The question asks for recent items
    pub recent: bool,
}

/// Result of classifying a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub filters: Option<QueryFilters>,
}

impl Classification {
    fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence,
            filters: None,
        }
    }

    fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Sector vocabulary in match order, each with its canonical name
///
/// Multi-word terms come first so "artificial intelligence" is not missed
/// in favour of a shorter alias.
pub const SECTORS: &[(&str, &str)] = &[
    ("artificial intelligence", "ai"),
    ("machine learning", "ml"),
    ("fintech", "fintech"),
    ("blockchain", "blockchain"),
    ("crypto", "crypto"),
    ("saas", "saas"),
    ("healthcare", "healthcare"),
    ("biotech", "biotech"),
    ("ai", "ai"),
    ("ml", "ml"),
];

const FUNDING_WORDS: &[&str] = &[
    "funding", "funded", "fund", "invested", "raise", "raised", "raises", "raising",
    "investment", "investments", "round", "series", "valuation",
];
const COMPANY_WORDS: &[&str] = &[
    "company", "companies", "startup", "startups", "firm", "firms", "business", "businesses",
];
const COMPETITION_WORDS: &[&str] = &[
    "compete", "competes", "competing", "competitor", "competitors", "competition", "rival",
    "rivals", "vs", "versus",
];
const LEADERSHIP_WORDS: &[&str] = &[
    "ceo", "cto", "cfo", "founder", "founders", "founded", "leadership", "leader", "leaders",
    "executive", "executives", "runs", "leads",
];
const INVESTOR_WORDS: &[&str] = &[
    "investor", "investors", "vc", "vcs", "venture", "backer", "backers", "backed", "portfolio",
];
const PERSON_WORDS: &[&str] = &["who", "person", "people", "executive", "entrepreneur"];
const TECHNOLOGY_WORDS: &[&str] = &[
    "technology", "technologies", "tech", "framework", "frameworks", "platform", "platforms",
    "model", "models", "tool", "tools",
];
const TREND_WORDS: &[&str] = &[
    "trend", "trends", "trending", "growth", "growing", "emerging", "popular", "momentum",
];
const RELATIONSHIP_WORDS: &[&str] = &[
    "relationship", "relationships", "connected", "connection", "connections", "related",
    "link", "linked", "between", "partner", "partners", "partnership",
];
const RECENT_WORDS: &[&str] = &["recent", "recently", "latest", "new", "last"];
const LIST_WORDS: &[&str] = &["which", "list", "show", "all"];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9'\-]*").expect("word pattern is valid"));

static ABOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\sabout\s+").expect("about pattern is valid"));

/// Lowercased question split into words
struct Question {
    text: String,
    words: Vec<String>,
}

impl Question {
    fn new(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        let words = WORD.find_iter(&text).map(|m| m.as_str().to_string()).collect();
        Self { text, words }
    }

    fn has_any(&self, vocabulary: &[&str]) -> bool {
        self.words.iter().any(|w| vocabulary.contains(&w.as_str()))
    }

    fn starts_with(&self, phrase: &str) -> bool {
        let mut words = phrase.split_whitespace();
        let mut own = self.words.iter();
        words.all(|w| own.next().is_some_and(|o| o == w))
    }

    /// "which ...", "what are ...", "list ...", "show ...", "what <plural> ...",
    /// or which/list/show/all anywhere
    fn is_list(&self) -> bool {
        if ["which", "what are", "list", "show"]
            .iter()
            .any(|p| self.starts_with(p))
        {
            return true;
        }
        if self.words.first().is_some_and(|w| w == "what")
            && self.words.get(1).is_some_and(|w| is_plural(w))
        {
            return true;
        }
        self.has_any(LIST_WORDS)
    }

    fn is_recent(&self) -> bool {
        self.has_any(RECENT_WORDS)
    }

    /// Canonical sector of the first vocabulary term present
    ///
    /// Terms of two characters or fewer must match a whole word.
    fn sector(&self) -> Option<String> {
        SECTORS.iter().find_map(|(term, canonical)| {
            let found = if term.chars().count() <= 2 {
                self.words.iter().any(|w| w == term)
            } else {
                self.text.contains(term)
            };
            found.then(|| canonical.to_string())
        })
    }

    fn filters(&self) -> QueryFilters {
        QueryFilters {
            sector: self.sector(),
            recent: self.is_recent(),
        }
    }

    fn mentions_about(&self) -> bool {
        self.words.iter().any(|w| w == "about")
    }
}

fn is_plural(word: &str) -> bool {
    word.len() > 3 && word.ends_with('s') && !word.ends_with("ss")
}

/// Classify a question
pub fn classify(question: &str) -> Classification {
    let q = Question::new(question);

    if q.has_any(FUNDING_WORDS) {
        if q.starts_with("who funded") || q.starts_with("who invested") || q.starts_with("who backed") {
            return Classification::new(Intent::FundingInfo, 0.9);
        }
        if q.is_list() {
            return Classification::new(Intent::ListFundedCompanies, 0.9).with_filters(q.filters());
        }
        return Classification::new(Intent::FundingInfo, 0.9);
    }

    if q.has_any(COMPANY_WORDS) || q.mentions_about() {
        if q.has_any(COMPETITION_WORDS) {
            return Classification::new(Intent::CompetitiveAnalysis, 0.85);
        }
        if q.has_any(LEADERSHIP_WORDS) {
            return Classification::new(Intent::CompanyLeadership, 0.85);
        }
        if q.is_list() {
            return Classification::new(Intent::ListCompaniesInSector, 0.85)
                .with_filters(q.filters());
        }
        return Classification::new(Intent::CompanyInfo, 0.7);
    }

    if q.has_any(INVESTOR_WORDS) {
        return Classification::new(Intent::InvestorInfo, 0.8);
    }
    if q.has_any(PERSON_WORDS) || q.has_any(LEADERSHIP_WORDS) {
        return Classification::new(Intent::PersonInfo, 0.8);
    }
    if q.has_any(TECHNOLOGY_WORDS) {
        return Classification::new(Intent::TechnologyInfo, 0.75);
    }
    if q.has_any(TREND_WORDS) {
        return Classification::new(Intent::TrendAnalysis, 0.75);
    }
    if q.has_any(RELATIONSHIP_WORDS) {
        return Classification::new(Intent::RelationshipQuery, 0.75);
    }

    Classification::new(Intent::GeneralSearch, 0.5)
}

/// Words that open a question rather than name something
const QUESTION_OPENERS: &[&str] = &[
    "who", "what", "which", "where", "when", "why", "how", "tell", "show", "list", "is", "are",
    "does", "did", "do", "can", "give", "find", "compare",
];

/// Runs of capitalised words, skipping a capitalised question opener
///
/// "How is Nvidia linked to Microsoft Azure?" gives `["Nvidia", "Microsoft Azure"]`.
pub fn extract_names(question: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, token) in question.split_whitespace().enumerate() {
        let word = token.trim_matches(|c: char| c.is_ascii_punctuation() && c != '-' && c != '.');
        let word = word.trim_end_matches(['?', '.', '!', ',']);
        let capitalised = word.chars().next().is_some_and(|c| c.is_uppercase());
        let opener = i == 0 && QUESTION_OPENERS.contains(&word.to_lowercase().as_str());

        if capitalised && !opener {
            current.push(word);
        } else if !current.is_empty() {
            names.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        names.push(current.join(" "));
    }
    names
}

/// Best guess at the entity a question is about
///
/// Takes the text after the last "about", otherwise the longest run of
/// capitalised words that does not open the question.
pub fn extract_subject(question: &str) -> Option<String> {
    let trimmed = question.trim();
    // offsets come from `trimmed` itself; lowercasing can change byte lengths
    if let Some(about) = ABOUT.find_iter(trimmed).last() {
        let subject = trimmed[about.end()..]
            .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
        if !subject.is_empty() {
            return Some(subject.to_string());
        }
    }

    extract_names(trimmed)
        .into_iter()
        .fold(None, |best: Option<String>, name| match best {
            Some(b) if b.split_whitespace().count() >= name.split_whitespace().count() => Some(b),
            _ => Some(name),
        })
}
