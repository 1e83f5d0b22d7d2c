use std::time::{Duration, Instant};

use log::{debug, o};
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::Environment;
use crate::errors::BackendError;
use crate::routes::{
    query::SongsQuery,
    rejection::{Context, Rejection},
};
use crate::sync;

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn songs(environment: Environment, query: SongsQuery) -> RouteResult {
    timed! {
        let limit = query.limit.unwrap_or(environment.config.default_limit);

        let response = sync::get_songs(&environment, limit).await;

        json(&response)
    }
}

pub async fn current_song(environment: Environment) -> RouteResult {
    timed! {
        let response = sync::get_songs(&environment, 1).await;
        let current = response.songs.into_iter().next();

        let status = if current.is_some() {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };

        with_status(json(&current), status)
    }
}

pub async fn sync_songs(environment: Environment) -> RouteResult {
    timed! {
        let kind = environment.store.as_ref().map(|store| store.kind());
        let logger = environment.logger.new(o!("trigger" => "http"));

        debug!(logger, "Running sync cycle...");
        let report = sync::sync_now(&environment)
            .await
            .map_err(|e: BackendError| Rejection::new(Context::sync(kind), e))?;

        json(&report)
    }
}

fn format_server_timing(elapsed: Duration) -> String {
    format!("handler;dur={}", elapsed.as_secs_f64() * 1000.0)
}
