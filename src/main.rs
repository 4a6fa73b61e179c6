//! histfan - letter histograms, one worker process per file.

mod cli;
mod error;
mod fanout;
mod histogram;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::sync::atomic::Ordering;
use std::time::Duration;

use cli::Cli;
use fanout::{Coordinator, parse_inputs};
use logging::LogConfig;

/// Exit status when Ctrl+C abandoned the wait for workers.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();

    if cli.internal_worker {
        init_logging(LogConfig::for_worker(), &cli);
        let Some(input) = cli.inputs.first() else {
            tracing::error!("Worker started without an input");
            std::process::exit(1);
        };
        // Never returns
        fanout::run_worker_main(cli.slot, input, Duration::from_millis(cli.delay_ms));
    }

    init_logging(LogConfig::for_coordinator(), &cli);

    match cmd_coordinate(&cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!(
                "{}: {}",
                "error"
                    .if_supports_color(Stderr, |text| text.red())
                    .if_supports_color(Stderr, |text| text.bold()),
                e
            );
            for cause in e.chain().skip(1) {
                eprintln!(
                    "  {}: {}",
                    "caused by".if_supports_color(Stderr, |text| text.yellow()),
                    cause
                );
            }
            std::process::exit(1);
        }
    }
}

fn init_logging(preset: LogConfig, cli: &Cli) {
    let mut config = preset
        .with_env_overrides()
        .with_verbosity(cli.verbose, cli.quiet);
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    logging::init(config);
}

/// Spawn the workers, wait for all of them, and report.
///
/// Returns the process exit code: 0 when every worker was accounted for,
/// 130 when Ctrl+C abandoned the wait.
fn cmd_coordinate(cli: &Cli) -> Result<i32> {
    tracing::info!(
        "{} {} :: letter histograms, one process per file",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = cli.coordinator_config();
    let specs = parse_inputs(&cli.inputs, &config.sentinel)?;

    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let coordinator = Coordinator::new(config);

    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, no longer waiting for workers...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    let summary = coordinator
        .run(&specs)
        .context("Failed to start workers")?;

    if summary.interrupted {
        eprintln!(
            "Interrupted with {} worker(s) still running ({} histogram(s) saved)",
            summary.outstanding, summary.stats.collected
        );
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(0)
}
