//! Entity name normalization and fuzzy comparison
//!
//! Names extracted from different articles rarely agree on punctuation,
//! casing or legal suffixes ("OpenAI, Inc." vs "OpenAI"). Everything that
//! compares names goes through [`normalize`] first.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::entity::EntityType;

/// Default ratio above which two normalized names count as the same entity
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Number of hex characters kept from the entity id digest
const ENTITY_ID_LEN: usize = 12;

static LEGAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[,\s]+(?:INC|LLC|LTD|CORP|COMPANY|CO|PVT|LLP|LP|PLC|AG|GMBH)\.?$")
        .expect("legal suffix pattern is valid")
});

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("character filter pattern is valid"));

/// Canonicalize an entity name for comparison
///
/// Uppercases, strips trailing legal suffixes, drops everything except word
/// characters, whitespace and hyphens, and collapses whitespace. The pass is
/// repeated until the output stops changing, so
/// `normalize(&normalize(x)) == normalize(x)` holds for every input.
pub fn normalize(name: &str) -> String {
    let mut current = name.to_uppercase();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn normalize_once(name: &str) -> String {
    let mut stripped = name.trim().to_string();
    while let Some(m) = LEGAL_SUFFIX.find(&stripped) {
        // keep at least one character of the actual name
        if m.start() == 0 {
            break;
        }
        stripped.truncate(m.start());
        stripped = stripped.trim_end().to_string();
    }

    let filtered = DISALLOWED_CHARS.replace_all(&stripped, "");
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic entity id: first 12 hex chars of `sha256("{type}:{normalized}")`
pub fn entity_id(entity_type: EntityType, name: &str) -> String {
    let key = format!("{}:{}", entity_type.as_str(), normalize(name));
    let digest = Sha256::digest(key.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ENTITY_ID_LEN);
    id
}

/// Sequence-matcher ratio `2M / (|a| + |b|)` between two strings
///
/// `M` is the total size of the matching blocks found by recursively taking
/// the longest common block and recursing on both sides of it. Two empty
/// strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched = matching_characters(&a, &b);
    2.0 * matched as f64 / total as f64
}

/// Whether two raw names refer to the same entity
///
/// True when the normalized names are equal or their [`similarity`] reaches
/// `threshold`. Names that normalize to nothing never match.
pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || similarity(&a, &b) >= threshold
}

/// Index of the preferred canonical name among `(name, occurrences)` pairs
///
/// Prefers the higher occurrence count, then the longer normalized name.
/// Ties go to the earliest candidate.
pub fn canonical_index(candidates: &[(&str, u64)]) -> Option<usize> {
    let mut best: Option<(usize, u64, usize)> = None;
    for (idx, (name, occurrences)) in candidates.iter().enumerate() {
        let len = normalize(name).chars().count();
        let better = match best {
            None => true,
            Some((_, best_occ, best_len)) => (*occurrences, len) > (best_occ, best_len),
        };
        if better {
            best = Some((idx, *occurrences, len));
        }
    }
    best.map(|(idx, _, _)| idx)
}

/// The preferred canonical name among `(name, occurrences)` pairs
pub fn choose_canonical_name<'a>(candidates: &[(&'a str, u64)]) -> Option<&'a str> {
    canonical_index(candidates).map(|idx| candidates[idx].0)
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    // b2j: positions of each char in b, used by the longest-block search
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` and `b[blo..bhi]`
///
/// Returns `(i, j, size)`; among equally long blocks the one starting
/// earliest in `a`, then earliest in `b`, wins.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // j2len[j] = length of the match ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_j2len: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = next_j2len;
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_legal_suffixes() {
        assert_eq!(normalize("OpenAI, Inc."), "OPENAI");
        assert_eq!(normalize("Acme Corp"), "ACME");
        assert_eq!(normalize("Siemens AG"), "SIEMENS");
        assert_eq!(normalize("Tata Consultancy Pvt Ltd"), "TATA CONSULTANCY");
        assert_eq!(normalize("  anthropic  "), "ANTHROPIC");
    }

    #[test]
    fn test_normalize_keeps_suffix_letters_inside_words() {
        assert_eq!(normalize("Tesco"), "TESCO");
        assert_eq!(normalize("Costco"), "COSTCO");
        assert_eq!(normalize("Inc"), "INC");
    }

    #[test]
    fn test_normalize_filters_characters() {
        assert_eq!(normalize("Scale   AI!"), "SCALE AI");
        assert_eq!(normalize("Hugging-Face (HF)"), "HUGGING-FACE HF");
        assert_eq!(normalize("Mistral.ai"), "MISTRALAI");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "OpenAI, Inc.",
            "Acme Co. Inc",
            "Acme (Co)",
            "Foo, LLC, Ltd.",
            "  weird   spacing  gmbh ",
            "Müller GmbH",
            "",
            "!!!",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("ABC", "ABC"), 1.0);
        assert_eq!(similarity("ABC", "XYZ"), 0.0);
        // "abcd" vs "bcde": matching block "bcd" -> 2*3/8
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        // classic sequence matcher example
        assert!((similarity("qabxcd", "abycdf") - (2.0 * 4.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_symmetric_for_simple_inputs() {
        let a = "OPENAI";
        let b = "OPEN AI";
        assert!((similarity(a, b) - similarity(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_is_similar() {
        assert!(is_similar("OpenAI", "OpenAI Inc.", DEFAULT_SIMILARITY_THRESHOLD));
        assert!(is_similar("OpenAI", "Open AI", DEFAULT_SIMILARITY_THRESHOLD));
        assert!(!is_similar("OpenAI", "Anthropic", DEFAULT_SIMILARITY_THRESHOLD));
        assert!(!is_similar("", "", DEFAULT_SIMILARITY_THRESHOLD));
    }

    #[test]
    fn test_entity_id_deterministic() {
        let a = entity_id(EntityType::Company, "OpenAI, Inc.");
        let b = entity_id(EntityType::Company, "openai");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other_type = entity_id(EntityType::Investor, "openai");
        assert_ne!(a, other_type);
    }

    #[test]
    fn test_choose_canonical_name() {
        let candidates = [("Open AI", 2), ("OpenAI Incorporated", 5)];
        assert_eq!(choose_canonical_name(&candidates), Some("OpenAI Incorporated"));

        // Equal occurrences: longer normalized name wins
        let candidates = [("Meta", 3), ("Meta Platforms", 3)];
        assert_eq!(choose_canonical_name(&candidates), Some("Meta Platforms"));

        // Full tie: first candidate wins
        let candidates = [("Stripe", 1), ("STRIPE", 1)];
        assert_eq!(canonical_index(&candidates), Some(0));

        assert_eq!(choose_canonical_name(&[]), None);
    }
}
