//! Reconstructs play times for a history that only says what was played,
//! not when.

use time::{Duration, OffsetDateTime};

use crate::song::{shifted, SongRecord};

/// Duration heuristics and markers used while estimating.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Assumed length of a regular song.
    pub average_song: Duration,

    /// Assumed length of a jingle.
    pub jingle: Duration,

    /// How far the upstream "now playing" lags behind the real stream.
    pub stream_delay: Duration,

    /// Lower-case marker that identifies a jingle.
    pub jingle_marker: String,

    /// Lower-case tokens; one of each set marks a live broadcast.
    pub live_markers: Vec<String>,
    pub broadcast_markers: Vec<String>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            average_song: Duration::seconds(210),
            jingle: Duration::seconds(30),
            stream_delay: Duration::seconds(20),
            jingle_marker: "jingle".to_owned(),
            live_markers: vec!["live".to_owned()],
            broadcast_markers: vec!["uitzending".to_owned(), "broadcast".to_owned()],
        }
    }
}

impl EstimatorConfig {
    /// The assumed play length of `record`.
    pub fn duration_of(&self, record: &SongRecord) -> Duration {
        if record.searchable_text().contains(&self.jingle_marker) {
            self.jingle
        } else {
            self.average_song
        }
    }

    /// Whether `record` is a segment of a live broadcast.
    pub fn is_live_broadcast(&self, record: &SongRecord) -> bool {
        let text = record.searchable_text();
        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let has = |markers: &[String]| markers.iter().any(|m| tokens.contains(&m.as_str()));

        has(&self.live_markers) && has(&self.broadcast_markers)
    }
}

/// State threaded through the history, newest entry first.
struct Walk {
    /// Start time of the last kept entry; `None` before the first one.
    cursor: Option<OffsetDateTime>,

    /// The previous kept entry was a live broadcast, so the next one is
    /// its continuation.
    skip_next: bool,

    kept: Vec<SongRecord>,
}

/// Assigns a play time to every record of a newest-first history.
///
/// The newest record is placed `stream_delay` before `now`; each older
/// record starts its own estimated duration before the record after it.
/// Records that already carry a time keep it and anchor the walk. The
/// entry right after a live broadcast segment is dropped.
pub fn estimate_playtimes(
    records: Vec<SongRecord>,
    now: OffsetDateTime,
    config: &EstimatorConfig,
) -> Vec<SongRecord> {
    let initial = Walk {
        cursor: None,
        skip_next: false,
        kept: Vec::with_capacity(records.len()),
    };

    let walk = records.into_iter().fold(initial, |mut walk, mut record| {
        if walk.skip_next {
            walk.skip_next = false;
            return walk;
        }

        let estimated = match walk.cursor {
            None => shifted(now, -config.stream_delay),
            Some(cursor) => shifted(cursor, -config.duration_of(&record)),
        };
        let played_at = record.played_at.unwrap_or(estimated);

        record.played_at = Some(played_at);
        walk.cursor = Some(played_at);
        walk.skip_next = config.is_live_broadcast(&record);
        walk.kept.push(record);

        walk
    });

    walk.kept
}
