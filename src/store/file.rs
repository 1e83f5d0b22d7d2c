use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::merge;
use crate::song::{timestamp_from_unix, SongRecord};

/// Everything the flat-file backend persists, in one JSON document.
#[derive(Debug, Default, Deserialize, Serialize)]
struct Ledger {
    #[serde(default)]
    artists: BTreeMap<String, Uuid>,

    #[serde(default)]
    songs: BTreeMap<String, StoredSong>,

    #[serde(default)]
    plays: Vec<PlayEvent>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct StoredSong {
    artist_id: Uuid,
    title: String,
    cover_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct PlayEvent {
    song_id: String,

    /// Seconds since the Unix epoch.
    played_at: i64,
}

impl Ledger {
    fn upsert_artist(&mut self, name: &str) -> Uuid {
        *self
            .artists
            .entry(name.to_owned())
            .or_insert_with(Uuid::new_v4)
    }

    fn upsert(&mut self, record: &SongRecord, window: Duration) -> bool {
        let artist_id = self.upsert_artist(&record.artist);

        self.songs.insert(
            record.id.clone(),
            StoredSong {
                artist_id,
                title: record.title.clone(),
                cover_url: record.cover_url.clone(),
            },
        );

        let played_at = match record.played_at {
            Some(played_at) => played_at.timestamp(),
            None => return false,
        };

        let window = window.whole_seconds().abs();
        let already_recorded = self
            .plays
            .iter()
            .any(|p| p.song_id == record.id && (p.played_at - played_at).abs() <= window);

        if already_recorded {
            return false;
        }

        self.plays.push(PlayEvent {
            song_id: record.id.clone(),
            played_at,
        });

        true
    }

    fn recent(&self, limit: usize) -> Vec<SongRecord> {
        let names: HashMap<&Uuid, &String> =
            self.artists.iter().map(|(name, id)| (id, name)).collect();

        let mut latest: HashMap<&str, i64> = HashMap::new();
        // hand-edited ledgers may carry times we cannot represent
        let valid = self
            .plays
            .iter()
            .filter(|play| timestamp_from_unix(play.played_at).is_some());

        for play in valid {
            let entry = latest.entry(play.song_id.as_str()).or_insert(play.played_at);
            if play.played_at > *entry {
                *entry = play.played_at;
            }
        }

        let records = latest
            .into_iter()
            .filter_map(|(id, played_at)| {
                let song = self.songs.get(id)?;
                let artist = names.get(&song.artist_id)?;

                Some(SongRecord {
                    id: id.to_owned(),
                    artist: (*artist).clone(),
                    title: song.title.clone(),
                    cover_url: song.cover_url.clone(),
                    played_at: timestamp_from_unix(played_at),
                })
            })
            .collect();

        merge::sort_and_limit(records, limit)
    }
}

/// The fallback backend: a single JSON file, rewritten atomically.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> BackendError {
        BackendError::SongsFile {
            path: self.path.clone(),
            source,
        }
    }

    async fn read(&self) -> Result<Ledger, BackendError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ledger::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&raw).map_err(|source| BackendError::MalformedSongsFile {
            path: self.path.clone(),
            source,
        })
    }

    async fn write(&self, ledger: &Ledger) -> Result<(), BackendError> {
        let raw = serde_json::to_vec_pretty(ledger).map_err(|source| {
            BackendError::MalformedSongsFile {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");

        tokio::fs::write(&staging, raw)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

impl super::Store for FileStore {
    fn save<'a>(
        &'a self,
        records: &'a [SongRecord],
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, BackendError>> {
        async move {
            if records.is_empty() {
                return Ok(0);
            }

            let _guard = self.lock.lock().await;
            let mut ledger = self.read().await?;

            let recorded = records
                .iter()
                .filter(|record| ledger.upsert(record, window))
                .count();

            self.write(&ledger).await?;

            Ok(recorded)
        }
        .boxed()
    }

    fn load_recent(&self, limit: usize) -> BoxFuture<Result<Vec<SongRecord>, BackendError>> {
        async move {
            let _guard = self.lock.lock().await;

            Ok(self.read().await?.recent(limit))
        }
        .boxed()
    }

    fn check_health(&self) -> BoxFuture<Result<(), BackendError>> {
        async move {
            let _guard = self.lock.lock().await;

            self.read().await.map(|_| ())
        }
        .boxed()
    }

    fn supports_interactions(&self) -> bool {
        false
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use time::OffsetDateTime;

    use super::*;
    use crate::song::Song;
    use crate::store::Store;

    fn at(minutes: i64) -> Option<OffsetDateTime> {
        Some(OffsetDateTime::from_unix_timestamp(1_700_000_000) + Duration::minutes(minutes))
    }

    fn record(artist: &str, title: &str, played_at: Option<OffsetDateTime>) -> SongRecord {
        SongRecord::new(Song::new(artist, title), "https://c/x.jpg", played_at)
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("songs.json"));

        assert!(store.load_recent(10).await.unwrap().is_empty());
        assert!(store.load_current().await.unwrap().is_none());
        assert_eq!(store.save(&[], Duration::minutes(10)).await.unwrap(), 0);
        assert!(store.check_health().await.is_ok());
    }

    #[tokio::test]
    async fn repeated_polls_record_one_play() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data").join("songs.json"));
        let window = Duration::minutes(10);

        let first = store
            .save(&[record("A", "B", at(0)), record("C", "D", at(-4))], window)
            .await
            .unwrap();
        let replay = store
            .save(&[record("A", "B", at(3)), record("C", "D", at(-4))], window)
            .await
            .unwrap();
        let later = store.save(&[record("A", "B", at(30))], window).await.unwrap();

        assert_eq!((first, replay, later), (2, 0, 1));

        let recent = store.load_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "a-b");
        assert_eq!(recent[0].played_at, at(30));
        assert_eq!(recent[1].id, "c-d");
    }

    #[tokio::test]
    async fn unknown_play_times_are_not_plays() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("songs.json"));

        let recorded = store
            .save(&[record("A", "B", None)], Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(recorded, 0);
        assert!(store.load_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn artists_are_created_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("songs.json");
        let store = FileStore::new(&path);

        store
            .save(
                &[record("A", "B", at(0)), record("A", "C", at(-5))],
                Duration::minutes(10),
            )
            .await
            .unwrap();

        let ledger: Ledger = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(ledger.artists.len(), 1);
        assert_eq!(ledger.songs.len(), 2);

        let current = store.load_current().await.unwrap().unwrap();
        assert_eq!(current.artist, "A");
        assert_eq!(current.title, "B");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("songs.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(
            store.load_recent(10).await,
            Err(BackendError::MalformedSongsFile { .. })
        ));
        assert!(store.check_health().await.is_err());
    }

    #[tokio::test]
    async fn unrepresentable_plays_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("songs.json");
        let artist = Uuid::new_v4();
        let ledger = serde_json::json!({
            "artists": { "A": artist },
            "songs": {
                "a-b": { "artist_id": artist, "title": "B", "cover_url": "https://c/x.jpg" },
                "a-c": { "artist_id": artist, "title": "C", "cover_url": "https://c/x.jpg" }
            },
            "plays": [
                { "song_id": "a-b", "played_at": 1_700_000_000 },
                { "song_id": "a-b", "played_at": 1_700_000_000_000_000_000i64 },
                { "song_id": "a-c", "played_at": i64::MIN }
            ]
        });
        std::fs::write(&path, serde_json::to_vec(&ledger).unwrap()).unwrap();
        let store = FileStore::new(&path);

        let recent = store.load_recent(10).await.unwrap();

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "a-b");
        assert_eq!(recent[0].played_at, at(0));
    }
}
