use std::convert::TryFrom;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use time::Duration;
use url::Url;

use crate::errors::ConfigError;
use crate::estimator::EstimatorConfig;
use crate::normalization::StationIdentity;

/// Returns the value of the named environment variable if it exists.
pub fn get_variable(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name))
}

/// Returns the value of the named environment variable, treating an
/// empty value as absent.
pub fn get_optional_variable(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parses the named environment variable, falling back to `default`
/// when it is not set.
pub fn parse_variable<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match get_optional_variable(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVariable { name, value }),
        None => Ok(default),
    }
}

fn parse_seconds(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    parse_variable(name, default)
}

/// Parses a non-negative number of seconds that must also fit a signed
/// duration.
fn parse_duration(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let seconds = parse_seconds(name, default)?;

    i64::try_from(seconds)
        .map(Duration::seconds)
        .map_err(|_| ConfigError::InvalidVariable {
            name,
            value: seconds.to_string(),
        })
}

/// Which persistence backend to construct at startup.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreSelection {
    Postgres { connection_string: String },
    File { path: PathBuf },
    None,
}

/// Policy constants shared by the write and read paths.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Two plays of the same song closer than this are the same play.
    pub proximity_window: Duration,

    /// The newest cached play must be at most this old to skip a live fetch.
    pub freshness_threshold: Duration,

    /// Limit used by the read API when the caller gives none.
    pub default_limit: usize,

    pub estimator: EstimatorConfig,
    pub station: StationIdentity,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            proximity_window: Duration::minutes(10),
            freshness_threshold: Duration::minutes(5),
            default_limit: 10,
            estimator: EstimatorConfig::default(),
            station: StationIdentity::default(),
        }
    }
}

/// Everything the server reads from its environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub upstream_url: Url,
    pub port: u16,
    pub admin_port: u16,
    pub songs_path: String,
    pub store: StoreSelection,
    pub poll_interval: Option<StdDuration>,
    pub fetch_timeout: StdDuration,
    pub health_cache_ttl: StdDuration,
    pub sync: SyncConfig,
}

impl Settings {
    /// Reads and validates the configuration. Nothing is connected yet.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_url = get_variable("SONGSYNC_UPSTREAM_URL")?;
        let upstream_url = Url::parse(&upstream_url).map_err(|source| ConfigError::InvalidUrl {
            name: "SONGSYNC_UPSTREAM_URL",
            source,
        })?;

        let store = match (
            get_optional_variable("SONGSYNC_DB_CONNECTION_STRING"),
            get_optional_variable("SONGSYNC_SONGS_FILE"),
        ) {
            (Some(connection_string), _) => StoreSelection::Postgres { connection_string },
            (None, Some(path)) => StoreSelection::File {
                path: PathBuf::from(path),
            },
            (None, None) => StoreSelection::None,
        };

        let poll_interval = match parse_seconds("SONGSYNC_POLL_INTERVAL_SECONDS", 60)? {
            0 => None,
            seconds => Some(StdDuration::from_secs(seconds)),
        };

        Ok(Settings {
            upstream_url,
            port: parse_variable("SONGSYNC_PORT", 3030)?,
            admin_port: parse_variable("SONGSYNC_ADMIN_PORT", 3031)?,
            songs_path: parse_variable("SONGSYNC_SONGS_PATH", "songs".to_owned())?,
            store,
            poll_interval,
            fetch_timeout: StdDuration::from_secs(parse_seconds(
                "SONGSYNC_FETCH_TIMEOUT_SECONDS",
                5,
            )?),
            health_cache_ttl: StdDuration::from_secs(parse_seconds(
                "SONGSYNC_HEALTH_CACHE_SECONDS",
                600,
            )?),
            sync: sync_config_from_env()?,
        })
    }
}

fn sync_config_from_env() -> Result<SyncConfig, ConfigError> {
    let defaults = SyncConfig::default();
    let station_defaults = defaults.station.clone();

    let placeholders = match get_optional_variable("SONGSYNC_PLACEHOLDER_NAMES") {
        Some(list) => list
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect(),
        None => station_defaults.placeholders,
    };

    Ok(SyncConfig {
        proximity_window: parse_duration("SONGSYNC_PROXIMITY_WINDOW_SECONDS", 600)?,
        freshness_threshold: parse_duration("SONGSYNC_FRESHNESS_SECONDS", 300)?,
        default_limit: parse_variable("SONGSYNC_DEFAULT_LIMIT", defaults.default_limit)?,
        estimator: EstimatorConfig {
            average_song: parse_duration("SONGSYNC_AVERAGE_SONG_SECONDS", 210)?,
            jingle: parse_duration("SONGSYNC_JINGLE_SECONDS", 30)?,
            stream_delay: parse_duration("SONGSYNC_STREAM_DELAY_SECONDS", 20)?,
            ..defaults.estimator
        },
        station: StationIdentity {
            name: parse_variable("SONGSYNC_STATION_NAME", station_defaults.name)?,
            logo_url: parse_variable("SONGSYNC_STATION_LOGO_URL", station_defaults.logo_url)?,
            placeholders,
            ..station_defaults
        },
    })
}
