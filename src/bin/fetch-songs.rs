use std::error::Error;
use std::time::Duration;

use structopt::StructOpt;
use time::OffsetDateTime;
use url::Url;

use log::{debug, info, initialize_logger};
use songsync::config::SyncConfig;
use songsync::fetcher::{HttpFetcher, Upstream};
use songsync::merge::sort_and_limit;
use songsync::sync::process_batch;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "fetch-songs",
    about = "Fetch the upstream feed once and print the processed songs as JSON"
)]
struct Opt {
    /// The upstream feed URL
    #[structopt(parse(try_from_str = Url::parse))]
    url: Url,

    /// How many songs to print
    #[structopt(short, long, default_value = "10")]
    limit: usize,

    /// Request timeout in seconds
    #[structopt(short, long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger();

    let fetcher = HttpFetcher::new(opt.url, Duration::from_secs(opt.timeout))?;

    debug!(logger, "Fetching..."; "url" => %fetcher.url());
    let entries = fetcher.fetch().await?;

    let records = process_batch(&entries, OffsetDateTime::now_utc(), &SyncConfig::default());
    info!(logger, "Fetched songs"; "fetched" => entries.len(), "unique" => records.len());

    println!(
        "{}",
        serde_json::to_string_pretty(&sort_and_limit(records, opt.limit))?
    );

    Ok(())
}
