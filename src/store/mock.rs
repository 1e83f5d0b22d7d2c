use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use time::Duration;

use crate::errors::BackendError;
use crate::merge;
use crate::song::SongRecord;
use crate::store::Store;

/// Keeps plays in memory. Can be switched to fail like a database that
/// went away.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) plays: RwLock<Vec<SongRecord>>,
    pub(crate) unavailable: AtomicBool,
}

impl MockStore {
    pub fn with_plays(plays: Vec<SongRecord>) -> Self {
        MockStore {
            plays: RwLock::new(plays),
            ..Default::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::SongsFile {
                path: "mock".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "mock store is down"),
            })
        } else {
            Ok(())
        }
    }
}

impl Store for MockStore {
    fn save<'a>(
        &'a self,
        records: &'a [SongRecord],
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, BackendError>> {
        async move {
            self.check()?;

            let mut plays = self.plays.write().unwrap();
            let mut recorded = 0;

            for record in records.iter().filter(|r| r.played_at.is_some()) {
                let duplicate = plays.iter().any(|p| {
                    p.id == record.id
                        && matches!((p.played_at, record.played_at), (Some(a), Some(b)) if (a - b).abs() <= window)
                });

                if !duplicate {
                    plays.push(record.clone());
                    recorded += 1;
                }
            }

            Ok(recorded)
        }
        .boxed()
    }

    fn load_recent(&self, limit: usize) -> BoxFuture<Result<Vec<SongRecord>, BackendError>> {
        async move {
            self.check()?;

            let plays = self.plays.read().unwrap().clone();

            Ok(merge::sort_and_limit(merge::dedupe_latest(plays), limit))
        }
        .boxed()
    }

    fn check_health(&self) -> BoxFuture<Result<(), BackendError>> {
        async move { self.check() }.boxed()
    }

    fn supports_interactions(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}
