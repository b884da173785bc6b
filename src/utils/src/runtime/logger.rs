use std::path::PathBuf;
use std::str::FromStr;

use either::Either;
use tracing::level_filters::LevelFilter as Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::filter;

use crate::env_var::env_var_is_true;

/// File name used inside the log directory.
pub const LOG_FILE_NAME: &str = "osmio.log";

const RUST_LOG_ENV: &str = "RUST_LOG";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogTarget {
    /// The target name for the log.
    pub target: String,
    /// The level filter for the target.
    pub level: tracing::metadata::LevelFilter,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '=');
        let target = parts
            .next()
            .ok_or("missing target name")?
            .trim()
            .to_string();
        if target.is_empty() {
            return Err("missing target name".to_string());
        }
        let level = parts
            .next()
            .ok_or("missing target level")?
            .trim()
            .parse::<tracing::metadata::LevelFilter>()
            .map_err(|_| format!("invalid level filter for target `{}`", target))?;
        Ok(LogTarget { target, level })
    }
}

pub struct LoggerSettings {
    /// The name of the program, printed once the logger is up.
    name: String,
    /// Enable colorful output in console.
    colorful: bool,
    /// Write into `<dir>/osmio.log` instead of `stderr`.
    log: Option<PathBuf>,
    /// Whether to include thread name in the log.
    with_thread_name: bool,
    /// Override target settings.
    targets: Vec<(String, tracing::metadata::LevelFilter)>,
    /// Override the default level.
    default_level: Option<tracing::metadata::LevelFilter>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self::new("osmio")
    }
}

impl LoggerSettings {
    /// Create a new logger settings with the given program name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            colorful: console::colors_enabled_stderr(),
            log: None,
            with_thread_name: false,
            targets: vec![],
            default_level: None,
        }
    }

    /// Write into a log directory instead of `stderr`.
    pub fn with_log(mut self, log: PathBuf) -> Self {
        self.log = Some(log);
        self
    }

    /// Whether to include thread name in the log.
    pub fn with_thread_name(mut self, enabled: bool) -> Self {
        self.with_thread_name = enabled;
        self
    }

    /// Overrides the default target settings.
    pub fn with_target(
        mut self,
        target: impl Into<String>,
        level: impl Into<tracing::metadata::LevelFilter>,
    ) -> Self {
        self.targets.push((target.into(), level.into()));
        self
    }

    /// Overrides the default target settings from a parsed `target=level` pair.
    pub fn with_log_target(self, target: LogTarget) -> Self {
        self.with_target(target.target, target.level)
    }

    /// Overrides the default level.
    pub fn with_default(mut self, level: impl Into<tracing::metadata::LevelFilter>) -> Self {
        self.default_level = Some(level.into());
        self
    }

    fn filter(&self) -> Targets {
        let default_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };
        let mut filter = filter::Targets::new().with_default(default_level);

        // Overrides from settings.
        filter = filter.with_targets(self.targets.clone());
        if let Some(default_level) = self.default_level {
            filter = filter.with_default(default_level);
        }

        // Overrides from env var. A malformed `RUST_LOG` is ignored rather
        // than aborting the program that only wanted to read a file.
        if let Ok(rust_log) = std::env::var(RUST_LOG_ENV)
            && !rust_log.is_empty()
        {
            match rust_log.parse::<Targets>() {
                Ok(rust_log_targets) => {
                    if let Some(default_level) = rust_log_targets.default_level() {
                        filter = filter.with_default(default_level);
                    }
                    filter = filter.with_targets(rust_log_targets);
                }
                Err(e) => eprintln!("ignoring malformed `RUST_LOG`: {}", e),
            }
        };

        filter
    }
}

/// Install the global `tracing` subscriber.
///
/// Output goes to `stderr` unless a log directory is configured. Standard
/// output is never used, it may be the sink of an OSM file being written.
pub fn init_osmio_logger(settings: LoggerSettings) {
    // Default timer for logging with local time offset.
    let default_timer = OffsetTime::local_rfc_3339().unwrap_or_else(|e| {
        eprintln!(
            "failed to get local time offset, falling back to UTC: {}",
            e
        );
        OffsetTime::new(
            time::UtcOffset::UTC,
            time::format_description::well_known::Rfc3339,
        )
    });

    let default_filter = settings.filter();
    let name = settings.name.clone();
    let log = settings.log.clone();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_names(settings.with_thread_name)
        .with_timer(default_timer)
        .with_ansi(settings.colorful && log.is_none())
        .with_writer(move || {
            if let Some(ref log) = log {
                std::fs::create_dir_all(log).unwrap_or_else(|e| {
                    panic!("failed to create log directory '{:?}': {}", log, e)
                });

                let path = log.join(LOG_FILE_NAME);
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .unwrap_or_else(|e| panic!("failed to create `{}`: {}", path.display(), e));
                Either::Right(file)
            } else {
                Either::Left(std::io::stderr())
            }
        });

    let fmt_layer = if env_var_is_true("ENABLE_PRETTY_LOG") {
        fmt_layer.pretty().boxed()
    } else {
        fmt_layer.boxed()
    };

    let layers = vec![fmt_layer.with_filter(default_filter).boxed()];
    tracing_subscriber::registry().with(layers).init();
    tracing::debug!(%name, "logger initialized");
}
