use std::convert::TryFrom;

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::errors::{BackendError, ConfigError};
use crate::song::{shifted, SongRecord};

const MAX_CONNECTIONS: u32 = 5;

/// The durable backend: artists, songs and play events in Postgres.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Validates the connection string without connecting, so a
    /// database that is down at startup only degrades requests.
    pub fn connect_lazy(connection_string: &str) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_timeout(std::time::Duration::from_secs(5))
            .connect_lazy(connection_string)
            .map_err(|source| ConfigError::Database { source })?;

        Ok(PgStore::new(pool))
    }
}

// these can be simplified once async functions in traits are stabilized
impl super::Store for PgStore {
    fn save<'a>(
        &'a self,
        records: &'a [SongRecord],
        window: Duration,
    ) -> BoxFuture<'a, Result<usize, BackendError>> {
        async move {
            if records.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            let mut recorded = 0;

            for record in records {
                let (artist_id,): (Uuid,) =
                    sqlx::query_as(include_str!("queries/upsert_artist.sql"))
                        .bind(&record.artist)
                        .fetch_one(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?;

                sqlx::query(include_str!("queries/upsert_song.sql"))
                    .bind(&record.id)
                    .bind(artist_id)
                    .bind(&record.title)
                    .bind(&record.cover_url)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                // an unknown play time is not a play we can place
                let played_at = match record.played_at {
                    Some(played_at) => played_at,
                    None => continue,
                };

                let inserted = sqlx::query(include_str!("queries/record_play.sql"))
                    .bind(&record.id)
                    .bind(played_at)
                    .bind(shifted(played_at, -window))
                    .bind(shifted(played_at, window))
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                recorded += inserted as usize;
            }

            tx.commit().await.map_err(map_sqlx_error)?;

            Ok(recorded)
        }
        .boxed()
    }

    fn load_recent(&self, limit: usize) -> BoxFuture<Result<Vec<SongRecord>, BackendError>> {
        async move {
            if limit == 0 {
                return Ok(vec![]);
            }

            let query = sqlx::query(include_str!("queries/load_recent.sql"));

            let records = query
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .try_map(|row: PgRow| {
                    let played_at: OffsetDateTime = try_get(&row, "played_at")?;

                    Ok(SongRecord {
                        id: try_get(&row, "id")?,
                        artist: try_get(&row, "artist")?,
                        title: try_get(&row, "title")?,
                        cover_url: try_get(&row, "cover_url")?,
                        played_at: Some(played_at),
                    })
                })
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(records)
        }
        .boxed()
    }

    fn check_health(&self) -> BoxFuture<Result<(), BackendError>> {
        async move {
            sqlx::query(include_str!("queries/health.sql"))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
        .boxed()
    }

    fn supports_interactions(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}

fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
    row: &'a PgRow,
    column: &str,
) -> Result<T, sqlx::Error> {
    use sqlx::prelude::*;

    row.try_get(column)
}

fn map_sqlx_error(error: sqlx::Error) -> BackendError {
    BackendError::Sqlx { source: error }
}
