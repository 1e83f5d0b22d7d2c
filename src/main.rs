use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{info, initialize_logger, warn};
use tokio::sync::mpsc;
use warp::Filter;

use songsync::config::Settings;
use songsync::environment::Environment;
use songsync::routes;
use songsync::sync::run_poller;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let settings = Settings::from_env()?;
    let main_port = settings.port;
    let admin_port = settings.admin_port;
    let poll_interval = settings.poll_interval;

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port, "upstream" => %settings.upstream_url);
    let logger = Arc::new(logger);

    let environment = Environment::from_settings(logger.clone(), &settings)?;

    match &environment.store {
        Some(store) => info!(logger, "Using song store"; "store" => store.kind()),
        None => warn!(logger, "No song store configured, serving live data only"),
    }

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: routes::admin::TerminationFunctionWrapper<'static> = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // the receiver is only gone once shutdown has begun
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let poller = {
        let should_terminate = should_terminate.clone();
        let environment = environment.clone();
        let logger = logger.clone();

        async move {
            match poll_interval {
                Some(interval) if environment.store.is_some() => {
                    run_poller(environment, interval, async {
                        should_terminate.await;
                    })
                    .await
                }
                _ => info!(logger, "Polling disabled"),
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::make_songs_routes(environment.clone());

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone())
            .or(routes::admin::make_termination_route(terminate.clone()));

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, poller, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
