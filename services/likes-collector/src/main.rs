//!
//! src/main.rs  Andrew Belles  Sept 13, 2025
//!
//! Entry point: parses the invocation, establishes the session and runs
//! the collector once over the account's liked tracks
//!
//!

mod config;
mod errors;
mod logging;

mod types;
mod fetch;
mod enrich;
mod download;
mod sink;
mod collector;

#[cfg(test)]
mod test_utils;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{error, info};

use crate::collector::{Clients, Collector, RunOutcome};
use crate::errors::CollectorError;

const EXIT_COLLECTED: u8 = 0;
const EXIT_EMPTY: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "likes-collector", version, about = "Collect liked Yandex Music tracks into a local archive")]
struct Cli {
    /// OAuth session token
    #[arg(long, env = "YANDEX_MUSIC_TOKEN", hide_env_values = true)]
    token: String,

    /// Archive root directory
    #[arg(long, env = "COLLECTOR_OUTPUT_DIR", default_value = "./music_collection")]
    output: PathBuf,

    /// Download full audio next to the manifest instead of linking previews
    #[arg(long, env = "COLLECTOR_DOWNLOAD_AUDIO")]
    download_audio: bool
}

async fn collect(cli: &Cli, token: &str, cfgs: &config::AppConfig) ->
    Result<RunOutcome, CollectorError> {
    let session   = fetch::YandexClient::connect(&cfgs.http, &cfgs.yandex, token).await?;
    let transport = fetch::ReqwestTransport::new(&cfgs.http)?;

    let collector = Collector::new(cfgs, Clients::new(session, transport));
    collector.run(&cli.output, cli.download_audio).await
}

fn summary(outcome: &RunOutcome) {
    let stats = &outcome.stats;
    println!("Collected {} of {} liked tracks ({} skipped)",
        outcome.collected(), outcome.liked, outcome.skipped);
    println!("  with media: {} ({:.1}%)", stats.with_media, stats.media_percentage());
    println!("  available:  {}", stats.available);
    for (genre, count) in stats.genres.iter().take(5) {
        println!("  {genre}: {count}");
    }
    if let Some(path) = &outcome.manifest_path {
        println!("Manifest written to {}", path.display());
    }
}

/// 0 when anything was collected, 1 for an empty archive, 2 when the run failed
fn exit_code(result: &Result<RunOutcome, CollectorError>) -> u8 {
    match result {
        Ok(outcome) if outcome.collected() > 0 => EXIT_COLLECTED,
        Ok(_) => EXIT_EMPTY,
        Err(_) => EXIT_FATAL
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // rejected before any network call
    let token = match config::validate_token(&cli.token) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let cfgs = match config::load_config() {
        Ok(cfgs) => cfgs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let _guard = match logging::init_logging(&cfgs.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    info!(
        service = "likes-collector",
        version = %env!("CARGO_PKG_VERSION"),
        token = %config::mask_token(&token),
        output = %cli.output.display(),
        download_audio = cli.download_audio,
        "starting"
    );

    let result = collect(&cli, &token, &cfgs).await;
    match &result {
        Ok(outcome) => summary(outcome),
        Err(e) => {
            error!(error = %e, session = e.is_session(), "collector.fatal");
            eprintln!("collection failed: {e}");
        }
    }
    ExitCode::from(exit_code(&result))
}
