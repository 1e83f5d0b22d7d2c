use std::convert::Infallible;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, Json, Reply};
use warp::Filter;

use crate::environment::Environment;
use crate::sync;

#[derive(Debug, Serialize)]
pub struct HealthzResponse<'a> {
    revision: Option<&'a str>,
    timestamp: Option<&'a str>,
    version: &'a str,
    store: Option<StoreStatus>,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    kind: &'static str,
    healthy: bool,
}

pub fn make_healthz_route(
    environment: Environment,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let handler = move || -> BoxFuture<'static, Result<Json, Infallible>> {
        let environment = environment.clone();

        async move {
            let healthy = sync::store_health(&environment).await;
            let store = environment.store.as_ref().map(|store| StoreStatus {
                kind: store.kind(),
                healthy: healthy.unwrap_or(false),
            });

            Ok(json(&HealthzResponse {
                revision: info::REVISION,
                timestamp: info::BUILD_TIMESTAMP,
                version: info::VERSION,
                store,
            }))
        }
        .boxed()
    };

    warp::path("healthz").and(warp::get()).and_then(handler)
}

type TerminationFuture<'a> = BoxFuture<'a, ()>;

pub type TerminationFunctionWrapper<'a> =
    Arc<dyn Fn() -> TerminationFuture<'a> + Send + Sync + 'a>;

pub fn make_termination_route<'a>(
    terminate: TerminationFunctionWrapper<'a>,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone + 'a {
    let handler = move || -> BoxFuture<'a, Result<StatusCode, Infallible>> {
        let terminate = terminate.clone();

        async move {
            let future = terminate();
            future.await;
            Ok(StatusCode::NO_CONTENT)
        }
        .boxed()
    };

    warp::path("terminate").and(warp::post()).and_then(handler)
}
