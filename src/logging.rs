//! Logging setup for the coordinator and its workers.
//!
//! Everything is written to stderr: a worker's stdout is its result
//! channel and must carry nothing but the histogram message.
//!
//! # Environment Variables
//!
//! - `HISTFAN_LOG` - Log filter (overrides RUST_LOG)
//! - `HISTFAN_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `HISTFAN_LOG_FORMAT` - Output format: pretty, compact, json
//! - `HISTFAN_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-field format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON lines
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Rotation policy for the optional log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    /// Single file, the default for short-lived runs
    #[default]
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            _ => Err(format!(
                "Unknown log rotation: '{}'. Valid options: hourly, daily, never",
                s
            )),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level
    pub level: Level,
    pub format: LogFormat,
    /// Extra log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show target module in logs
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            file_path: None,
            rotation: LogRotation::Never,
            filter: None,
            show_target: false,
        }
    }
}

impl LogConfig {
    /// Preset for the coordinator: info level, so the input echo and
    /// per-worker termination lines are visible.
    pub fn for_coordinator() -> Self {
        Self::default()
    }

    /// Preset for worker processes: only warnings and errors.
    pub fn for_worker() -> Self {
        Self {
            level: Level::WARN,
            ..Self::default()
        }
    }

    /// Derive the level from `-v`/`-q` counts on top of the preset.
    ///
    /// An explicit `-v` or `-q` also drops any filter, so it beats
    /// `HISTFAN_LOG`/`RUST_LOG` from the environment.
    pub fn with_verbosity(mut self, verbose: u8, quiet: bool) -> Self {
        if quiet || verbose > 0 {
            self.filter = None;
        }
        let level = if quiet {
            Level::ERROR
        } else {
            match verbose {
                0 => self.level,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };
        self.with_level(level)
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Apply environment variable overrides. Call this before the
    /// command-line settings so that flags win.
    ///
    /// A filter set on the config wins over `HISTFAN_LOG`/`RUST_LOG`, and
    /// `HISTFAN_LOG_LEVEL` only applies when no filter is set at all.
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none()
            && let Ok(filter) = std::env::var("HISTFAN_LOG").or_else(|_| std::env::var("RUST_LOG"))
        {
            self = self.with_filter(filter);
        }

        if self.filter.is_none()
            && let Ok(level_str) = std::env::var("HISTFAN_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("HISTFAN_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        if let Ok(path) = std::env::var("HISTFAN_LOG_FILE") {
            self = self.with_file(PathBuf::from(path));
        }

        if let Ok(rotation) = std::env::var("HISTFAN_LOG_ROTATION")
            && let Ok(r) = rotation.parse()
        {
            self.rotation = r;
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                fallback()
            }),
            None => fallback(),
        }
    }

    fn stderr_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_target(self.show_target)
            .with_writer(std::io::stderr);
        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.boxed(),
        }
    }

    fn file_layer(&self) -> Option<Box<dyn Layer<Registry> + Send + Sync>> {
        let path = self.file_path.as_ref()?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("histfan.log");
        let appender = RollingFileAppender::new(self.rotation.into(), parent, file_name);

        let base = fmt::layer()
            .with_target(self.show_target)
            .with_ansi(false)
            .with_writer(appender);
        Some(match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.boxed(),
        })
    }
}

/// Parse a log level string.
fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global subscriber. Later calls are silently ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();

    let mut layers = vec![config.stderr_layer()];
    if let Some(file) = config.file_layer() {
        layers.push(file);
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("full".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_rotation_from_str() {
        assert_eq!("daily".parse::<LogRotation>().unwrap(), LogRotation::Daily);
        assert_eq!("never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::for_coordinator().level, Level::INFO);
        assert_eq!(LogConfig::for_worker().level, Level::WARN);
    }

    #[test]
    fn test_verbosity() {
        let config = LogConfig::for_worker().with_verbosity(0, false);
        assert_eq!(config.level, Level::WARN);

        let config = LogConfig::for_coordinator().with_verbosity(1, false);
        assert_eq!(config.level, Level::DEBUG);

        let config = LogConfig::for_coordinator().with_verbosity(3, false);
        assert_eq!(config.level, Level::TRACE);

        let config = LogConfig::for_coordinator().with_verbosity(2, true);
        assert_eq!(config.level, Level::ERROR);
    }

    #[test]
    fn test_verbosity_flags_drop_env_filter() {
        let config = LogConfig::for_coordinator()
            .with_filter("info".to_string())
            .with_verbosity(0, true);
        assert_eq!(config.level, Level::ERROR);
        assert!(config.filter.is_none());

        let config = LogConfig::for_coordinator()
            .with_filter("warn".to_string())
            .with_verbosity(1, false);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.filter.is_none());

        // No flag: the filter stays
        let config = LogConfig::for_coordinator()
            .with_filter("histfan=trace".to_string())
            .with_verbosity(0, false);
        assert_eq!(config.filter.as_deref(), Some("histfan=trace"));
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_filter("histfan=trace".to_string())
            .with_file(PathBuf::from("/tmp/histfan-test.log"));

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("histfan=trace"));
        assert_eq!(
            config.file_path,
            Some(PathBuf::from("/tmp/histfan-test.log"))
        );
    }
}
