//! Deduplication within one fetch and reconciliation of the cache with
//! a live fetch.

use std::cmp::Ordering;
use std::collections::HashMap;

use time::{Duration, OffsetDateTime};

use crate::song::SongRecord;

/// Orders unknown play times before every known one, for comparisons only.
fn comparable(played_at: Option<OffsetDateTime>) -> OffsetDateTime {
    played_at.unwrap_or_else(OffsetDateTime::unix_epoch)
}

/// Collapses repeated identifiers, keeping the latest play of each. The
/// first occurrence's position is kept, so newest-first input stays
/// newest-first.
pub fn dedupe_latest(records: Vec<SongRecord>) -> Vec<SongRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<SongRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.id) {
            Some(&index) => {
                if comparable(record.played_at) > comparable(unique[index].played_at) {
                    unique[index] = record;
                }
            }
            None => {
                positions.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

/// Newest first; unknown play times last.
pub fn compare_newest_first(a: &SongRecord, b: &SongRecord) -> Ordering {
    match (a.played_at, b.played_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sorts newest first and keeps at most `limit` records.
pub fn sort_and_limit(mut records: Vec<SongRecord>, limit: usize) -> Vec<SongRecord> {
    records.sort_by(compare_newest_first);
    records.truncate(limit);
    records
}

/// Picks between a cached and a live record for the same song.
fn reconcile(cached: SongRecord, live: SongRecord, window: Duration) -> SongRecord {
    let cached_at = comparable(cached.played_at);
    let live_at = comparable(live.played_at);

    if (live_at - cached_at).abs() <= window || cached_at >= live_at {
        cached
    } else {
        live
    }
}

/// Merges the cache with a live fetch. Plays closer than `window` are
/// the same play and the cache wins; otherwise the later play wins.
pub fn merge_sources(
    cached: Vec<SongRecord>,
    live: Vec<SongRecord>,
    window: Duration,
    limit: usize,
) -> Vec<SongRecord> {
    let mut merged: HashMap<String, SongRecord> = HashMap::with_capacity(cached.len() + live.len());

    for record in dedupe_latest(cached) {
        merged.insert(record.id.clone(), record);
    }

    for record in live {
        let chosen = match merged.remove(&record.id) {
            Some(existing) => reconcile(existing, record, window),
            None => record,
        };

        merged.insert(chosen.id.clone(), chosen);
    }

    sort_and_limit(merged.into_iter().map(|(_, record)| record).collect(), limit)
}
