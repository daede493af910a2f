//! Custom assertions for store verification

use paste_store::{SearchHit, TagCount};

/// Count reported for `tag`; an absent tag counts as zero
pub fn count_of(stats: &[TagCount], tag: &str) -> i64 {
    stats
        .iter()
        .find(|row| row.tag == tag)
        .map_or(0, |row| row.count)
}

/// Assert tag statistics are ordered by count descending, then tag ascending
pub fn assert_stats_ordered(stats: &[TagCount]) {
    for pair in stats.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.count > b.count || (a.count == b.count && a.tag < b.tag),
            "Tag stats out of order: {:?} before {:?}",
            a,
            b
        );
    }
}

pub fn keys_of(hits: &[SearchHit]) -> Vec<&str> {
    hits.iter().map(|hit| hit.key.as_str()).collect()
}

/// Assert search hits are ordered by key
pub fn assert_hits_ordered(hits: &[SearchHit]) {
    let keys = keys_of(hits);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "Search hits not ordered by key");
}
