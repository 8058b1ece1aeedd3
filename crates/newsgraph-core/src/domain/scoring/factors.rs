//! Sub-scores of the relationship strength formula
//!
//! Every function here returns a value on the 0-10 scale.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::knowledge::RelationshipType;

/// Recency score when the article date is missing or unparseable
pub const DEFAULT_RECENCY: f64 = 5.0;

const STATEMENT_VERBS: &[&str] = &["announced", "confirmed", "stated", "said", "reported"];
const HEDGING_WORDS: &[&str] = &["likely", "probably", "appears", "seems", "suggests"];
const IMPORTANCE_KEYWORDS: &[&str] = &["major", "significant", "important", "key", "primary", "main"];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]+").expect("word pattern is valid"));

fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Score from the number of times an edge key has been observed
///
/// 0 -> 0, 1 -> 5, then linear up to 10 at 5 observations, saturating.
pub fn frequency_score(observations: u64) -> f64 {
    match observations {
        0 => 0.0,
        1 => 5.0,
        n if n <= 5 => 5.0 + (n - 1) as f64 * 1.25,
        _ => 10.0,
    }
}

/// Piecewise-linear decay over the age of the source article
///
/// `None` means the date was missing or unparseable. Future dates count as
/// brand new.
pub fn recency_score(days_ago: Option<f64>) -> f64 {
    let Some(days) = days_ago else {
        return DEFAULT_RECENCY;
    };
    if days.is_nan() {
        return DEFAULT_RECENCY;
    }

    fn lerp(days: f64, from_day: f64, to_day: f64, from: f64, to: f64) -> f64 {
        from + (days - from_day) / (to_day - from_day) * (to - from)
    }

    if days <= 7.0 {
        10.0
    } else if days <= 30.0 {
        lerp(days, 7.0, 30.0, 10.0, 7.0)
    } else if days <= 90.0 {
        lerp(days, 30.0, 90.0, 7.0, 5.0)
    } else if days <= 365.0 {
        lerp(days, 90.0, 365.0, 5.0, 0.0)
    } else {
        0.0
    }
}

/// Textual credibility of an edge description
///
/// A quotation outranks a statement verb, which outranks hedging.
pub fn credibility_score(description: &str) -> f64 {
    if description.contains('"') || description.contains('\u{201c}') || description.contains('\u{201d}') {
        return 10.0;
    }
    let words = words(description);
    if words.iter().any(|w| STATEMENT_VERBS.contains(&w.as_str())) {
        8.0
    } else if words.iter().any(|w| HEDGING_WORDS.contains(&w.as_str())) {
        2.0
    } else {
        5.0
    }
}

/// Richness of the description plus type and keyword bonuses, capped at 10
pub fn context_score(description: &str, relationship_type: RelationshipType) -> f64 {
    let length = description.chars().count();
    let mut score = match length {
        0..50 => 3.0,
        50..100 => 5.0,
        100..200 => 7.0,
        _ => 9.0,
    };

    if relationship_type.is_high_signal() {
        score += 1.0;
    }

    let keyword_hits = words(description)
        .iter()
        .filter(|w| IMPORTANCE_KEYWORDS.contains(&w.as_str()))
        .count();
    score += (keyword_hits as f64 * 0.5).min(2.0);

    score.min(10.0)
}
