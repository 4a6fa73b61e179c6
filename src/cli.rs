//! Command-line interface definitions using clap.

use crate::fanout::{CoordinatorConfig, DEFAULT_SENTINEL};
use crate::logging::LogFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Compute letter histograms of files, one worker process per file.
///
/// Each FILE is handled by its own process; results are written to
/// `<FILE><pid>.hist`. An argument equal to the sentinel (default `SIG`)
/// spawns a worker that is interrupted with SIGINT right after it starts.
#[derive(Parser, Debug)]
#[command(name = "histfan")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Files to histogram, or the sentinel token.
    #[arg(value_name = "FILE")]
    pub inputs: Vec<String>,

    /// Token that requests an interrupted worker.
    #[arg(long, env = "HISTFAN_SENTINEL", default_value = DEFAULT_SENTINEL)]
    pub sentinel: String,

    /// Time each worker stays alive after sending its histogram (ms).
    #[arg(long, env = "HISTFAN_BASE_DELAY_MS", default_value_t = 10_000)]
    pub base_delay_ms: u64,

    /// Additional hold time per argument position (ms).
    #[arg(long, env = "HISTFAN_STAGGER_MS", default_value_t = 3_000)]
    pub stagger_ms: u64,

    /// Interval between checks for worker completion (ms).
    #[arg(long, env = "HISTFAN_POLL_INTERVAL_MS", default_value_t = 1_000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Write result files under this directory instead of next to the inputs.
    #[arg(long, env = "HISTFAN_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Run as a worker process (internal use only).
    #[arg(long, hide = true)]
    pub internal_worker: bool,

    /// Worker slot index (internal use only).
    #[arg(long, hide = true, default_value_t = 0)]
    pub slot: usize,

    /// Worker hold time after sending (internal use only).
    #[arg(long, hide = true, default_value_t = 0)]
    pub delay_ms: u64,
}

/// Log format choices on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            sentinel: self.sentinel.clone(),
            base_delay: Duration::from_millis(self.base_delay_ms),
            stagger: Duration::from_millis(self.stagger_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            output_dir: self.output_dir.clone(),
            worker_exe: None,
        }
    }
}
