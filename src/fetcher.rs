use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use url::Url;

use crate::errors::{BackendError, ConfigError};
use crate::song::{timestamp_from_unix, RawTrackEntry};

/// A source of "now playing" and recent history, newest first.
pub trait Upstream: Send + Sync {
    /// Fetches the current track followed by the history. An `Err`
    /// means the provider is unavailable, never that the station is
    /// silent.
    fn fetch(&self) -> BoxFuture<Result<Vec<RawTrackEntry>, BackendError>>;
}

/// The response shapes of the provider generations we know about.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProviderFeed {
    /// `{"nowplaying": "...", "history": [...], "covers": [...]}`
    NowPlaying {
        nowplaying: String,
        #[serde(default)]
        history: Vec<String>,
        #[serde(default)]
        covers: Vec<String>,
    },

    /// `{"items": [{"title": "...", "date": 0, "enclosure": {"url": "..."}}]}`
    RecentFeed { items: Vec<FeedItem> },
}

#[derive(Debug, Deserialize)]
pub struct FeedItem {
    title: String,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    date: Option<i64>,

    #[serde(default)]
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
pub struct Enclosure {
    url: String,
}

impl ProviderFeed {
    /// Flattens the feed into `[current, ...history]`.
    pub fn into_entries(self) -> Vec<RawTrackEntry> {
        match self {
            ProviderFeed::NowPlaying {
                nowplaying,
                history,
                covers,
            } => std::iter::once(nowplaying)
                .chain(history)
                .enumerate()
                .map(|(i, title)| RawTrackEntry {
                    title,
                    cover_url: covers.get(i).cloned(),
                    played_at: None,
                })
                .collect(),
            ProviderFeed::RecentFeed { items } => items
                .into_iter()
                .map(|item| RawTrackEntry {
                    title: item.title,
                    cover_url: item.enclosure.map(|e| e.url),
                    // a date we cannot represent is left to the estimator
                    played_at: item
                        .date
                        .and_then(|ms| timestamp_from_unix(ms.div_euclid(1000))),
                })
                .collect(),
        }
    }
}

/// Decodes a raw upstream body.
pub fn parse_feed(body: &[u8]) -> Result<Vec<RawTrackEntry>, BackendError> {
    let feed: ProviderFeed =
        serde_json::from_slice(body).map_err(BackendError::MalformedUpstreamBody)?;

    Ok(feed.into_entries())
}

/// Fetches the feed over HTTP with a bounded timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("songsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;

        Ok(HttpFetcher { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Upstream for HttpFetcher {
    fn fetch(&self) -> BoxFuture<Result<Vec<RawTrackEntry>, BackendError>> {
        fetch(self).boxed()
    }
}

async fn fetch(fetcher: &HttpFetcher) -> Result<Vec<RawTrackEntry>, BackendError> {
    let response = fetcher
        .client
        .get(fetcher.url.clone())
        .send()
        .await
        .map_err(|source| BackendError::UpstreamUnavailable { source })?;

    let status = response.status();

    if !status.is_success() {
        return Err(BackendError::UpstreamStatus(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| BackendError::UpstreamUnavailable { source })?;

    parse_feed(&body)
}
