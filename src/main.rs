//! swing-analyze: analyze one swing clip and print the result as JSON.
//!
//! Usage: swing-analyze <video> [left|right]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use swing_tracker::video::VideoInput;
use swing_tracker::{Config, Handedness, SwingPipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "swing_tracker.toml";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args() -> Result<(PathBuf, Handedness)> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .context("usage: swing-analyze <video> [left|right]")?;
    let handedness = match args.next() {
        Some(s) => s.parse::<Handedness>()?,
        None => Handedness::Right,
    };
    Ok((path, handedness))
}

fn main() -> ExitCode {
    init_logging();
    info!("swing-analyze ({})", env!("GIT_VERSION"));

    let (path, handedness) = match parse_args() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let config = Config::load_or_default(CONFIG_PATH);
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = SwingPipeline::new(config);
    let result = runtime.block_on(pipeline.analyze_video(&VideoInput::File(path), handedness));

    match result {
        Ok(analysis) => match serde_json::to_string_pretty(&analysis) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("failed to serialize analysis: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(reason = e.reason_code(), "{e}");
            ExitCode::FAILURE
        }
    }
}
