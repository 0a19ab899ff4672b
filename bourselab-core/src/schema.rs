//! Fuzzy column resolution for tables of unknown schema.
//!
//! User-supplied spreadsheets have arbitrary column order and naming, often
//! in a mix of English and Persian. A required semantic field (say
//! `market_cap`) is located by scoring every observed column label against
//! the field name and a ranked alias list with a token-order-insensitive
//! similarity measure.
//!
//! Resolution is a pure function over (observed labels, alias list,
//! threshold) — no I/O — so it can be exercised with synthetic label sets.

use std::collections::BTreeMap;

/// Minimum similarity (0–100) for a column to be accepted.
pub const MATCH_THRESHOLD: u8 = 80;

/// A resolved column: the original (un-normalized) label plus its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub column: String,
    pub score: u8,
}

/// Normalize a label for comparison: lowercase, non-alphanumerics to
/// spaces, whitespace collapsed.
pub fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token-sort similarity on a 0–100 scale.
///
/// Both strings are normalized, their tokens sorted, and the results
/// compared with normalized Levenshtein distance. Sorting makes the score
/// insensitive to token order ("cap market" vs "market cap" scores 100).
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let sorted = |s: &str| {
        let norm = normalize_label(s);
        let mut tokens: Vec<&str> = norm.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let (a, b) = (sorted(a), sorted(b));
    (strsim::normalized_levenshtein(&a, &b) * 100.0).round() as u8
}

/// Best-scoring observed label for a query string. Ties keep the first
/// candidate in map order, which is deterministic.
fn extract_best<'m>(
    query: &str,
    observed: &'m BTreeMap<String, String>,
) -> Option<(&'m String, u8)> {
    let mut best: Option<(&'m String, u8)> = None;
    for (normalized, original) in observed {
        let score = token_sort_ratio(query, normalized);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((original, score));
        }
    }
    best
}

/// Resolve a semantic field against a set of observed column labels.
///
/// `observed` maps normalized labels to their original spelling (see
/// [`normalize_label`]). Two phases:
///
/// 1. Fuzzy-match the field name itself; accept the best column if it
///    scores at least `threshold`. Direct name matches are preferred over
///    the alias list because they are less likely to false-positive on
///    coincidentally similar alias text.
/// 2. Otherwise score every alias against every label and accept the
///    highest-scoring pair that clears `threshold` (first alias wins ties).
///
/// Returns `None` when nothing clears the threshold.
pub fn resolve_field(
    field: &str,
    observed: &BTreeMap<String, String>,
    aliases: &[&str],
    threshold: u8,
) -> Option<FieldMatch> {
    if let Some((original, score)) = extract_best(field, observed) {
        if score >= threshold {
            return Some(FieldMatch {
                column: original.clone(),
                score,
            });
        }
    }

    let mut best: Option<FieldMatch> = None;
    for alias in aliases {
        if let Some((original, score)) = extract_best(alias, observed) {
            if score >= threshold && best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(FieldMatch {
                    column: original.clone(),
                    score,
                });
            }
        }
    }
    best
}

/// Build the normalized-label → original-label map for a header row.
/// Later duplicates of an identical normalized label are ignored.
pub fn observed_labels(headers: &[String]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for h in headers {
        let norm = normalize_label(h);
        if !norm.is_empty() {
            map.entry(norm).or_insert_with(|| h.clone());
        }
    }
    map
}
