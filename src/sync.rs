//! The write path (fetch, normalize, estimate, dedupe, save) and the
//! read path (cache, freshness check, live fallback, merge).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use log::{debug, info, o, warn, Logger};
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::SyncConfig;
use crate::environment::{Environment, SafeUpstream};
use crate::errors::BackendError;
use crate::estimator::estimate_playtimes;
use crate::merge::{dedupe_latest, merge_sources, sort_and_limit};
use crate::song::{optional_timestamp, RawTrackEntry, SongRecord};

/// The outcome of one write-path cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,

    /// Plays newly recorded by the store.
    pub updated_count: usize,

    /// Songs in the deduplicated batch.
    pub fetched_count: usize,

    #[serde(with = "optional_timestamp")]
    pub timestamp: Option<OffsetDateTime>,
}

/// What the read API returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongsResponse {
    pub songs: Vec<SongRecord>,
    pub can_add_to_favorites: bool,
}

/// Normalizes, estimates and deduplicates one upstream batch.
pub fn process_batch(
    entries: &[RawTrackEntry],
    now: OffsetDateTime,
    config: &SyncConfig,
) -> Vec<SongRecord> {
    let records = entries
        .iter()
        .map(|entry| SongRecord::from_entry(entry, &config.station))
        .collect();

    dedupe_latest(estimate_playtimes(records, now, &config.estimator))
}

/// Fetches and processes a live batch.
pub async fn fetch_live(
    upstream: &SafeUpstream,
    now: OffsetDateTime,
    config: &SyncConfig,
) -> Result<Vec<SongRecord>, BackendError> {
    let entries = upstream.fetch().await?;

    Ok(process_batch(&entries, now, config))
}

/// Runs one write-path cycle now. Fails instead of waiting when another
/// cycle is running.
pub async fn sync_now(environment: &Environment) -> Result<SyncReport, BackendError> {
    sync_at(environment, OffsetDateTime::now_utc()).await
}

pub(crate) async fn sync_at(
    environment: &Environment,
    now: OffsetDateTime,
) -> Result<SyncReport, BackendError> {
    let store = environment
        .store
        .as_ref()
        .ok_or(BackendError::StoreNotConfigured)?;

    let _guard = environment
        .sync_guard
        .try_lock()
        .map_err(|_| BackendError::SyncInProgress)?;

    let logger = environment.logger.new(o!("cycle" => now.timestamp()));

    debug!(logger, "Fetching songs from upstream...");
    let entries = environment.upstream.fetch().await?;

    if entries.is_empty() {
        return Err(BackendError::NoSongsFetched);
    }

    let records = process_batch(&entries, now, &environment.config);
    debug!(logger, "Processed upstream batch"; "fetched" => entries.len(), "unique" => records.len());

    let updated_count = store
        .save(&records, environment.config.proximity_window)
        .await?;

    info!(logger, "Saved songs"; "store" => store.kind(), "unique" => records.len(), "recorded" => updated_count);

    Ok(SyncReport {
        success: true,
        updated_count,
        fetched_count: records.len(),
        timestamp: Some(now),
    })
}

/// Returns at most `limit` songs, newest first. Never fails: every
/// problem degrades to whatever data is still reachable.
pub async fn get_songs(environment: &Environment, limit: usize) -> SongsResponse {
    get_songs_at(environment, limit, OffsetDateTime::now_utc()).await
}

pub(crate) async fn get_songs_at(
    environment: &Environment,
    limit: usize,
    now: OffsetDateTime,
) -> SongsResponse {
    let logger = environment.logger.new(o!("limit" => limit));
    let config = &environment.config;

    let cached = match &environment.store {
        Some(store) => match store.load_recent(limit).await {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(logger, "Store unavailable, falling back to upstream"; "error" => %e);
                None
            }
        },
        None => None,
    };

    let songs = match cached {
        Some(cached) if is_fresh(&cached, now, config) => {
            debug!(logger, "Serving cached songs"; "count" => cached.len());
            cached
        }
        Some(cached) => match fetch_live(environment.upstream.as_ref(), now, config).await {
            Ok(live) => merge_sources(cached, live, config.proximity_window, limit),
            Err(e) => {
                warn!(logger, "Upstream unavailable, serving stale cache"; "error" => %e);
                sort_and_limit(cached, limit)
            }
        },
        None => match fetch_live(environment.upstream.as_ref(), now, config).await {
            Ok(live) => sort_and_limit(live, limit),
            Err(e) => {
                warn!(logger, "Upstream unavailable and no cache"; "error" => %e);
                vec![]
            }
        },
    };

    SongsResponse {
        songs,
        can_add_to_favorites: environment.can_add_to_favorites(),
    }
}

/// Whether the newest cached play is recent enough to skip the upstream.
fn is_fresh(cached: &[SongRecord], now: OffsetDateTime, config: &SyncConfig) -> bool {
    cached
        .iter()
        .filter_map(|record| record.played_at)
        .max()
        .map(|newest| now - newest <= config.freshness_threshold)
        .unwrap_or(false)
}

/// Checks the store, remembering the answer for the cache's lifetime.
/// `None` means no store is configured.
pub async fn store_health(environment: &Environment) -> Option<bool> {
    let store = environment.store.as_ref()?;

    if let Some(healthy) = environment.health.get() {
        return Some(healthy);
    }

    let healthy = store.check_health().await.is_ok();
    environment.health.set(healthy);

    Some(healthy)
}

/// Runs the write path every `interval` until `shutdown` resolves.
/// Failures are logged and retried on the next tick only.
pub async fn run_poller(
    environment: Environment,
    interval: StdDuration,
    shutdown: impl Future<Output = ()>,
) {
    let logger: Arc<Logger> = environment.logger.clone();
    let mut ticks = tokio::time::interval(interval);

    tokio::pin!(shutdown);

    info!(logger, "Starting poller"; "interval_seconds" => interval.as_secs());

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticks.tick() => {
                match sync_now(&environment).await {
                    Ok(report) => debug!(logger, "Poll complete"; "recorded" => report.updated_count),
                    Err(BackendError::StoreNotConfigured) => {
                        warn!(logger, "No store configured, stopping poller");
                        break;
                    }
                    Err(e) => warn!(logger, "Poll failed"; "error" => %e),
                }
            }
        }
    }

    info!(logger, "Poller stopped");
}
