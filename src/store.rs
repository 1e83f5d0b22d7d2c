use futures::future::BoxFuture;
use time::Duration;

use crate::errors::BackendError;
use crate::song::SongRecord;

mod file;
#[cfg(test)]
pub(crate) mod mock;
mod postgres;

pub use self::file::FileStore;
pub use self::postgres::PgStore;

/// Persistence for observed plays. Every operation is a no-op on zero
/// records, and an `Err` always means the backend could not be used,
/// never that it is empty.
pub trait Store: Send + Sync {
    /// Upserts artists and songs, and records a play for every record
    /// with no play of the same song within `window`. Returns how many
    /// plays were recorded.
    fn save<'a>(
        &'a self,
        records: &'a [SongRecord],
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, BackendError>>;

    /// The `limit` most recently played songs, newest first.
    fn load_recent(&self, limit: usize) -> BoxFuture<Result<Vec<SongRecord>, BackendError>>;

    /// The most recently played song, if any.
    fn load_current(&self) -> BoxFuture<Result<Option<SongRecord>, BackendError>> {
        use futures::FutureExt;

        let recent = self.load_recent(1);

        async move { Ok(recent.await?.into_iter().next()) }.boxed()
    }

    /// Cheap round trip used by the health check.
    fn check_health(&self) -> BoxFuture<Result<(), BackendError>>;

    /// Whether records from this store can carry favorites and comments.
    fn supports_interactions(&self) -> bool;

    /// A short name for logs and the health check.
    fn kind(&self) -> &'static str;
}
