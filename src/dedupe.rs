//! One record per URL.
//!
//! When a URL repeats, the LAST occurrence's value wins. The output keeps the
//! position where each URL was first seen, so a later duplicate replaces the
//! earlier entry in place rather than moving it to the end.

use std::collections::HashMap;

use crate::bookmark::BookmarkRecord;

pub fn dedupe(records: impl IntoIterator<Item = BookmarkRecord>) -> Vec<BookmarkRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<BookmarkRecord> = Vec::new();

    for record in records {
        match positions.get(&record.url) {
            Some(&index) => out[index] = record,
            None => {
                positions.insert(record.url.clone(), out.len());
                out.push(record);
            }
        }
    }

    out
}

/// Number of records `dedupe` would collapse away.
pub fn duplicate_count(records: &[BookmarkRecord]) -> usize {
    let mut url_counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *url_counts.entry(record.url.as_str()).or_insert(0) += 1;
    }
    url_counts.values().map(|count| count - 1).sum()
}
