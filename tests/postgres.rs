//! Runs against the database named by `SONGSYNC_DB_CONNECTION_STRING`
//! and does nothing when it is unset. Set `SONGSYNC_TEST_INITIALIZE_DB=1`
//! to apply `migrations/` first.

use std::env;
use std::sync::Once;

use sqlx::postgres::{PgPool, PgPoolOptions};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use songsync::song::{timestamp_from_unix, Song, SongRecord};
use songsync::store::{PgStore, Store};

static INITIALIZE_DB: Once = Once::new();

fn window() -> Duration {
    Duration::minutes(10)
}

async fn prepare_db() -> Option<(PgStore, PgPool)> {
    dotenv::dotenv().ok();

    let connection_string = env::var("SONGSYNC_DB_CONNECTION_STRING").ok()?;

    if env::var("SONGSYNC_TEST_INITIALIZE_DB").unwrap_or_else(|_| "0".to_owned()) == "1" {
        let connection_string = connection_string.clone();

        tokio::task::spawn_blocking(move || {
            INITIALIZE_DB.call_once(|| initialize_db_for_test(&connection_string))
        })
        .await
        .expect("initialize DB");
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&connection_string)
        .await
        .expect("connect to SONGSYNC_DB_CONNECTION_STRING");

    Some((PgStore::new(pool.clone()), pool))
}

fn initialize_db_for_test(connection_string: &str) {
    use movine::Movine;
    use postgres::{Client, NoTls};

    let mut client = Client::connect(connection_string, NoTls)
        .expect("create postgres::Client from SONGSYNC_DB_CONNECTION_STRING");
    let mut movine = Movine::new(&mut client);

    movine.set_migration_dir("migrations");
    movine.set_strict(true);

    if movine.status().is_err() {
        movine.initialize().expect("initialize movine");
    }

    movine.up().expect("run movine migrations");
}

/// Names unique to one test run, so runs can share a database.
fn unique(label: &str) -> String {
    format!("{} {}", label, Uuid::new_v4().to_simple())
}

fn historical(seconds: i64) -> OffsetDateTime {
    // 2001-09-09, well behind anything a live poller writes
    timestamp_from_unix(1_000_000_000 + seconds).unwrap()
}

fn record(artist: &str, title: &str, played_at: OffsetDateTime) -> SongRecord {
    SongRecord::new(
        Song::new(artist, title),
        "https://covers.example.com/1.jpg",
        Some(played_at),
    )
}

async fn count(pool: &PgPool, sql: &str, value: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(sql)
        .bind(value)
        .fetch_one(pool)
        .await
        .expect("count rows");

    count
}

async fn plays_of(pool: &PgPool, song_id: &str) -> i64 {
    count(
        pool,
        "SELECT COUNT(*) FROM play_events WHERE song_id = $1",
        song_id,
    )
    .await
}

#[tokio::test]
async fn replaying_a_batch_records_nothing() {
    let (store, pool) = match prepare_db().await {
        Some(db) => db,
        None => return,
    };

    let artist = unique("Replay");
    let records = vec![
        record(&artist, "First", historical(600)),
        record(&artist, "Second", historical(0)),
    ];

    assert_eq!(store.save(&records, window()).await.unwrap(), 2);
    assert_eq!(store.save(&records, window()).await.unwrap(), 0);

    for record in &records {
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM songs WHERE id = $1", &record.id).await,
            1
        );
        assert_eq!(plays_of(&pool, &record.id).await, 1);
    }

    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM artists WHERE name = $1", &artist).await,
        1
    );
}

#[tokio::test]
async fn plays_inside_the_window_are_suppressed() {
    let (store, pool) = match prepare_db().await {
        Some(db) => db,
        None => return,
    };

    let artist = unique("Window");
    let first = record(&artist, "Song", historical(3_600));
    let id = first.id.clone();

    assert_eq!(store.save(&[first], window()).await.unwrap(), 1);

    // five minutes later is the same play, reported again
    let nearby = record(&artist, "Song", historical(3_600 + 300));
    assert_eq!(store.save(&[nearby], window()).await.unwrap(), 0);

    let earlier = record(&artist, "Song", historical(3_600 - 300));
    assert_eq!(store.save(&[earlier], window()).await.unwrap(), 0);
    assert_eq!(plays_of(&pool, &id).await, 1);

    let later = record(&artist, "Song", historical(3_600 + 1_800));
    assert_eq!(store.save(&[later], window()).await.unwrap(), 1);
    assert_eq!(plays_of(&pool, &id).await, 2);
}

#[tokio::test]
async fn songs_without_a_play_time_are_only_upserted() {
    let (store, pool) = match prepare_db().await {
        Some(db) => db,
        None => return,
    };

    let artist = unique("Undated");
    let mut undated = record(&artist, "Song", historical(0));
    undated.played_at = None;

    assert_eq!(store.save(&[undated.clone()], window()).await.unwrap(), 0);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM songs WHERE id = $1", &undated.id).await,
        1
    );
    assert_eq!(plays_of(&pool, &undated.id).await, 0);
}

#[tokio::test]
async fn artists_are_shared_by_name() {
    let (store, pool) = match prepare_db().await {
        Some(db) => db,
        None => return,
    };

    let artist = unique("Shared");
    let records = vec![
        record(&artist, "One", historical(7_200)),
        record(&artist, "Two", historical(7_200 - 600)),
    ];

    store.save(&records, window()).await.unwrap();
    store.save(&records[..1], window()).await.unwrap();

    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM artists WHERE name = $1", &artist).await,
        1
    );

    let (distinct,): (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT artist_id) FROM songs WHERE id = ANY($1)",
    )
    .bind(records.iter().map(|r| r.id.clone()).collect::<Vec<_>>())
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(distinct, 1);
}

#[tokio::test]
async fn recent_songs_are_newest_first() {
    let (store, _pool) = match prepare_db().await {
        Some(db) => db,
        None => return,
    };

    // the other tests write historical plays, so these are the latest
    let now = timestamp_from_unix(OffsetDateTime::now_utc().unix_timestamp()).unwrap();
    let artist = unique("Recent");
    let older = record(&artist, "Older", now - Duration::minutes(20));
    let newer = record(&artist, "Newer", now);

    store
        .save(&[older.clone(), newer.clone()], window())
        .await
        .unwrap();

    let recent = store.load_recent(2).await.unwrap();

    assert_eq!(recent, vec![newer.clone(), older]);
    assert_eq!(recent[0].artist, artist);
    assert_eq!(store.load_current().await.unwrap(), Some(newer));
    assert!(store.load_recent(0).await.unwrap().is_empty());

    // an unbounded limit must not wrap into a negative LIMIT
    let everything = store.load_recent(usize::MAX).await.unwrap();
    assert_eq!(everything[..2], recent[..]);
}
