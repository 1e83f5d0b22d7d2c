use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, Reply, WithStatus};
use warp::Filter;

use crate::environment::Environment;
use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;

pub use internal::*;

/// Every songs route, with backend errors turned into JSON replies.
pub fn make_songs_routes(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let logger = environment.logger.clone();

    make_list_route(environment.clone())
        .or(make_current_route(environment.clone()))
        .or(make_sync_route(environment))
        .recover(move |r| format_rejection(logger.clone(), r))
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        SyncInProgress => StatusCode::CONFLICT,
        UpstreamUnavailable { .. } | UpstreamStatus(..) | MalformedUpstreamBody(..) | NoSongsFetched => {
            StatusCode::BAD_GATEWAY
        }
        e if e.is_store_failure() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{get as g, path as p, post, query};

    use super::{handlers, query as q};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let r = environment.songs_path.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_list_route => songs, rt; end(), g(), query::<q::SongsQuery>());
    route!(make_current_route => current_song, rt; p("current"), end(), g());
    route!(make_sync_route => sync_songs, rt; p("sync"), end(), post());
}
