use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::normalization::{self, StationIdentity};

/// One upstream track before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTrackEntry {
    /// The combined `"Title - Artist"` string.
    pub title: String,

    /// The cover art URL, if the provider sent one.
    pub cover_url: Option<String>,

    /// When the provider says the track was played, if it says so.
    pub played_at: Option<OffsetDateTime>,
}

impl RawTrackEntry {
    pub fn new(title: impl Into<String>) -> Self {
        RawTrackEntry {
            title: title.into(),
            cover_url: None,
            played_at: None,
        }
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn with_played_at(mut self, played_at: OffsetDateTime) -> Self {
        self.played_at = Some(played_at);
        self
    }
}

/// An artist and title. Two songs are equal when their canonical
/// identifiers are.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Song {
    pub artist: String,
    pub title: String,
}

impl Song {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Song {
            artist: artist.into(),
            title: title.into(),
        }
    }

    pub fn id(&self) -> String {
        normalization::canonical_id(self)
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// The canonical unit that is stored, merged and served.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    /// The canonical identifier of `(artist, title)`.
    pub id: String,

    pub artist: String,

    pub title: String,

    pub cover_url: String,

    /// When the song was played. `None` means unknown, not the epoch.
    #[serde(default, with = "optional_timestamp")]
    pub played_at: Option<OffsetDateTime>,
}

impl SongRecord {
    pub fn new(
        song: Song,
        cover_url: impl Into<String>,
        played_at: Option<OffsetDateTime>,
    ) -> Self {
        SongRecord {
            id: song.id(),
            artist: song.artist,
            title: song.title,
            cover_url: cover_url.into(),
            played_at,
        }
    }

    /// Normalizes one upstream entry: split, replace filler names,
    /// pick the cover and derive the identifier.
    pub fn from_entry(entry: &RawTrackEntry, station: &StationIdentity) -> Self {
        let upstream = normalization::split_title(&entry.title);
        let cover_url = normalization::enrich_cover(entry.cover_url.as_deref(), &upstream, station);
        let song = normalization::enrich_identity(&upstream, station);

        SongRecord::new(song, cover_url, entry.played_at)
    }

    /// The text searched for markers such as "jingle".
    pub(crate) fn searchable_text(&self) -> String {
        format!("{} {}", self.artist, self.title).to_lowercase()
    }
}

/// 0001-01-01T00:00:00Z, the earliest play time we represent.
pub const EARLIEST_TIMESTAMP: i64 = -62_135_596_800;

/// 9999-12-31T23:59:59Z, the latest play time we represent.
pub const LATEST_TIMESTAMP: i64 = 253_402_300_799;

/// Converts Unix seconds, or `None` when they fall outside the
/// representable range.
pub fn timestamp_from_unix(seconds: i64) -> Option<OffsetDateTime> {
    if (EARLIEST_TIMESTAMP..=LATEST_TIMESTAMP).contains(&seconds) {
        Some(OffsetDateTime::from_unix_timestamp(seconds))
    } else {
        None
    }
}

/// `at + by`, saturating at the representable range.
pub fn shifted(at: OffsetDateTime, by: Duration) -> OffsetDateTime {
    let target = at.timestamp().saturating_add(by.whole_seconds());

    if (EARLIEST_TIMESTAMP..=LATEST_TIMESTAMP).contains(&target) {
        at + by
    } else {
        OffsetDateTime::from_unix_timestamp(target.clamp(EARLIEST_TIMESTAMP, LATEST_TIMESTAMP))
    }
}

/// (De)serializes an optional date and time as a Unix timestamp in seconds.
pub mod optional_timestamp {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        match value {
            Some(timestamp) => serializer.serialize_some(&timestamp.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where D: Deserializer<'de> {
        let seconds: Option<i64> = Deserialize::deserialize(deserializer)?;

        seconds
            .map(|seconds| {
                super::timestamp_from_unix(seconds)
                    .ok_or_else(|| D::Error::custom(format!("timestamp {} is out of range", seconds)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn songs_compare_by_identity() {
        assert_eq!(
            Song::new("Schintaler", "Wat n nach"),
            Song::new("SCHINTALER", "Wat n' nach")
        );
        assert_ne!(
            Song::new("Schintaler", "Wat n nach"),
            Song::new("Wat n nach", "Schintaler")
        );
    }

    #[test]
    fn entries_become_records() {
        let station = StationIdentity::default();
        let entry = RawTrackEntry::new("Sjoenkeldaddy's - Schintaler")
            .with_cover("https://covers.example.com/1.jpg");

        let record = SongRecord::from_entry(&entry, &station);

        assert_eq!(record.id, "schintaler-sjoenkeldaddys");
        assert_eq!(record.artist, "Schintaler");
        assert_eq!(record.title, "Sjoenkeldaddy's");
        assert_eq!(record.cover_url, "https://covers.example.com/1.jpg");
        assert_eq!(record.played_at, None);
    }

    #[test]
    fn filler_entries_are_attributed_to_the_station() {
        let station = StationIdentity::default();
        let entry = RawTrackEntry::new("Carnaval-Radio.nl Jingle")
            .with_cover("https://covers.example.com/nocover.png");

        let record = SongRecord::from_entry(&entry, &station);

        assert_eq!(record.artist, station.name);
        assert_eq!(record.title, "Carnaval-Radio.nl Jingle");
        assert_eq!(record.cover_url, station.logo_url);
    }

    #[test]
    fn played_at_round_trips_through_json() {
        let record = SongRecord::new(
            Song::new("Schintaler", "Wat n nach"),
            "https://covers.example.com/1.jpg",
            Some(OffsetDateTime::from_unix_timestamp(1_700_000_000)),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["playedAt"], 1_700_000_000);

        let unknown: SongRecord = serde_json::from_str(
            r#"{"id":"a-b","artist":"a","title":"b","coverUrl":"","playedAt":null}"#,
        )
        .unwrap();
        assert_eq!(unknown.played_at, None);
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        assert!(timestamp_from_unix(1_700_000_000_000_000_000).is_none());
        assert!(timestamp_from_unix(i64::MIN).is_none());
        assert_eq!(
            timestamp_from_unix(LATEST_TIMESTAMP).map(|t| t.timestamp()),
            Some(LATEST_TIMESTAMP)
        );

        let result: Result<SongRecord, _> = serde_json::from_str(
            r#"{"id":"a-b","artist":"a","title":"b","coverUrl":"","playedAt":1700000000000000000}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn shifting_saturates() {
        let earliest = OffsetDateTime::from_unix_timestamp(EARLIEST_TIMESTAMP);
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000);

        assert_eq!(shifted(earliest, -Duration::hours(1)), earliest);
        assert_eq!(
            shifted(now, Duration::seconds(i64::MAX)).timestamp(),
            LATEST_TIMESTAMP
        );
        assert_eq!(shifted(now, -Duration::minutes(5)), now - Duration::minutes(5));
    }
}
