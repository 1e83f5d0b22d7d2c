use std::path::PathBuf;

use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The upstream provider could not be reached or timed out.
    #[error("Upstream provider unavailable: {source}")]
    UpstreamUnavailable { source: reqwest::Error },

    /// The upstream provider answered with a non-success status.
    #[error("Upstream provider returned status {0}")]
    UpstreamStatus(u16),

    /// The upstream body was not one of the known feed shapes.
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamBody(#[source] serde_json::Error),

    /// The upstream provider returned nothing to record.
    #[error("No songs fetched from upstream provider")]
    NoSongsFetched,

    /// Represents an SQL error.
    #[error("Database error: {source}")]
    Sqlx { source: sqlx::Error },

    /// The songs file could not be read or written.
    #[error("Could not access songs file {path:?}: {source}")]
    SongsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The songs file exists but does not parse.
    #[error("Malformed songs file {path:?}: {source}")]
    MalformedSongsFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// No persistent store was configured at startup.
    #[error("No song store is configured")]
    StoreNotConfigured,

    /// Another write cycle holds the sync guard.
    #[error("A sync cycle is already in progress")]
    SyncInProgress,
}

impl BackendError {
    /// Whether this error means the store could not be used at all, as
    /// opposed to the upstream provider failing.
    pub fn is_store_failure(&self) -> bool {
        use BackendError::*;

        matches!(
            self,
            Sqlx { .. } | SongsFile { .. } | MalformedSongsFile { .. } | StoreNotConfigured
        )
    }
}

/// Enumerates errors in the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("must define {0} environment variable")]
    MissingVariable(&'static str),

    #[error("could not parse {name}={value:?}")]
    InvalidVariable { name: &'static str, value: String },

    #[error("could not parse {name} as URL")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error("could not build HTTP client")]
    HttpClient { source: reqwest::Error },

    #[error("invalid database connection string")]
    Database { source: sqlx::Error },
}
