//! Relevance ranker — literal keyword scoring over the catalog.
//!
//! score = (keywords found as substrings of the query)
//!       + 2 if the record's name is a substring of the query.
//!
//! Zero-score records are excluded. Ties keep catalog order. The result is
//! fully reproducible for a given query and catalog.

use madoguchi_core::service::{RankedMatch, ServiceRecord};

/// Default number of matches handed to the assembler.
pub const DEFAULT_LIMIT: usize = 3;

/// Bonus for a name hit.
const NAME_BONUS: u32 = 2;

/// Score a single record against `query`.
pub fn score(query: &str, record: &ServiceRecord) -> u32 {
    let keyword_hits = record
        .keywords
        .iter()
        .filter(|k| !k.is_empty() && query.contains(k.as_str()))
        .count() as u32;
    let name_hit = if !record.name.is_empty() && query.contains(record.name.as_str()) {
        NAME_BONUS
    } else {
        0
    };
    keyword_hits + name_hit
}

/// Rank `catalog` against `query`, best first, at most `limit` entries.
pub fn rank(query: &str, catalog: &[ServiceRecord], limit: usize) -> Vec<RankedMatch> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<RankedMatch> = catalog
        .iter()
        .filter_map(|record| {
            let score = score(query, record);
            (score > 0).then(|| RankedMatch {
                record: record.clone(),
                score,
            })
        })
        .collect();

    // sort_by is stable: equal scores keep catalog order
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches.truncate(limit);
    matches
}
