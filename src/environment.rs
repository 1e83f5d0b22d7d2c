use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::Logger;

use crate::config::{Settings, StoreSelection, SyncConfig};
use crate::errors::ConfigError;
use crate::fetcher::{HttpFetcher, Upstream};
use crate::store::{FileStore, PgStore, Store};

pub type SafeStore = dyn Store + Send + Sync;
pub type SafeUpstream = dyn Upstream + Send + Sync;

/// Everything a request handler or sync cycle needs, built once at
/// startup and shared by reference.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub upstream: Arc<SafeUpstream>,
    pub store: Option<Arc<SafeStore>>,
    pub config: Arc<SyncConfig>,
    pub songs_path: String,

    /// Held for the duration of one write-path cycle.
    pub(crate) sync_guard: Arc<tokio::sync::Mutex<()>>,

    pub(crate) health: Arc<HealthCache>,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        upstream: Arc<SafeUpstream>,
        store: Option<Arc<SafeStore>>,
        config: SyncConfig,
    ) -> Self {
        Environment {
            logger,
            upstream,
            store,
            config: Arc::new(config),
            songs_path: "songs".to_owned(),
            sync_guard: Arc::new(tokio::sync::Mutex::new(())),
            health: Arc::new(HealthCache::new(Duration::from_secs(600))),
        }
    }

    /// Builds the upstream client and the selected store from settings.
    pub fn from_settings(logger: Arc<Logger>, settings: &Settings) -> Result<Self, ConfigError> {
        let upstream = HttpFetcher::new(settings.upstream_url.clone(), settings.fetch_timeout)?;

        let store: Option<Arc<SafeStore>> = match &settings.store {
            StoreSelection::Postgres { connection_string } => {
                Some(Arc::new(PgStore::connect_lazy(connection_string)?))
            }
            StoreSelection::File { path } => Some(Arc::new(FileStore::new(path.clone()))),
            StoreSelection::None => None,
        };

        let mut environment =
            Environment::new(logger, Arc::new(upstream), store, settings.sync.clone());
        environment.songs_path = settings.songs_path.clone();
        environment.health = Arc::new(HealthCache::new(settings.health_cache_ttl));

        Ok(environment)
    }

    /// Whether clients may attach favorites and comments to songs.
    pub fn can_add_to_favorites(&self) -> bool {
        self.store
            .as_ref()
            .map(|store| store.supports_interactions())
            .unwrap_or(false)
    }
}

/// Remembers the last store health check for a while.
pub struct HealthCache {
    ttl: Duration,
    last: Mutex<Option<(Instant, bool)>>,
}

impl HealthCache {
    pub fn new(ttl: Duration) -> Self {
        HealthCache {
            ttl,
            last: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<bool> {
        let last = self.last.lock().ok()?;

        match *last {
            Some((checked_at, healthy)) if checked_at.elapsed() < self.ttl => Some(healthy),
            _ => None,
        }
    }

    pub fn set(&self, healthy: bool) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some((Instant::now(), healthy));
        }
    }
}
