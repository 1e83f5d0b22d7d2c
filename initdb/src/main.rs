//! Applies the song store schema to the database named by
//! `SONGSYNC_DB_CONNECTION_STRING`.

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, info, initialize_logger};

fn main() {
    dotenv::dotenv().ok();

    let logger = initialize_logger();
    let connection_string = env::var("SONGSYNC_DB_CONNECTION_STRING")
        .expect("could not read SONGSYNC_DB_CONNECTION_STRING");
    let migrations = env::var("SONGSYNC_MIGRATIONS_DIR").unwrap_or_else(|_| "./migrations".to_owned());

    debug!(logger, "Connecting to database...");

    let client = Client::connect(&connection_string, NoTls).expect("could not connect to database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migrations);

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize().expect("failed to initialize movine")
    }

    debug!(logger, "Running migrations..."; "dir" => &migrations);
    movine.up().expect("failed to run migrations");

    info!(logger, "Schema is up to date.");
}
