//! Rolling-file log backend for hosts of the guardianship core.
//!
//! Core code only emits `log` macros shaped as
//! `event=<name> module=<module> status=<status> key=value...`, carrying ids
//! and outcomes, never names or contact details. This module owns the
//! optional `flexi_logger` backend, configured from [`CoreConfig`].
//!
//! # Invariants
//! - At most one backend is started per process.
//! - Starting again with equal settings is a no-op; different settings are
//!   rejected instead of silently reconfiguring.

use crate::config::CoreConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, LogSpecification, Logger, LoggerHandle,
    Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

const LOG_FILE_BASENAME: &str = "careconnect";
const PANIC_SUMMARY_MAX_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Backend settings derived from a validated [`CoreConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    /// Absolute directory holding `careconnect*.log` files.
    pub dir: PathBuf,
    /// Size at which the current file is rotated.
    pub max_file_bytes: u64,
    /// Rotated files kept on disk.
    pub max_files: usize,
}

impl LogSettings {
    /// Returns `None` when the config does not ask for file logging.
    pub fn from_config(config: &CoreConfig) -> Result<Option<Self>, LoggingError> {
        let Some(dir) = config.log_dir.clone() else {
            return Ok(None);
        };
        let level = parse_level(&config.log_level)
            .ok_or_else(|| LoggingError::UnknownLevel(config.log_level.clone()))?;
        Ok(Some(Self {
            level,
            dir,
            max_file_bytes: config.log_max_file_bytes,
            max_files: config.log_max_files,
        }))
    }
}

#[derive(Debug)]
pub enum LoggingError {
    UnknownLevel(String),
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// A backend with other settings already runs in this process.
    AlreadyActive { dir: PathBuf, level: LevelFilter },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::CreateDir { dir, source } => {
                write!(f, "failed to create log directory `{}`: {source}", dir.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyActive { dir, level } => write!(
                f,
                "logging already active at `{}` with level `{level}`",
                dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            Self::UnknownLevel(_) | Self::AlreadyActive { .. } => None,
        }
    }
}

/// Starts file logging when `config.log_dir` is set.
///
/// Returns `Ok(false)` without touching the `log` facade when no directory
/// is configured, leaving hosts free to install their own backend.
pub fn init_from_config(config: &CoreConfig) -> Result<bool, LoggingError> {
    match LogSettings::from_config(config)? {
        Some(settings) => init_logging(&settings).map(|()| true),
        None => Ok(false),
    }
}

/// Starts the rolling-file backend, once per process.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let active = ACTIVE.get_or_try_init(|| start(settings))?;
    if active.settings != *settings {
        return Err(LoggingError::AlreadyActive {
            dir: active.settings.dir.clone(),
            level: active.settings.level,
        });
    }
    Ok(())
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Case-insensitive level name; `off` is not a valid core level.
pub(crate) fn parse_level(level: &str) -> Option<LevelFilter> {
    match LevelFilter::from_str(level.trim()) {
        Ok(LevelFilter::Off) | Err(_) => None,
        Ok(level) => Some(level),
    }
}

fn start(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateDir {
        dir: settings.dir.clone(),
        source,
    })?;

    let handle = Logger::with(LogSpecification::builder().default(settings.level).build())
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.clone())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(settings.max_file_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(settings.max_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    install_panic_logger();
    info!(
        "event=core_init module=core status=ok version={} platform={} level={} max_file_bytes={} max_files={} schema_version={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        settings.level,
        settings.max_file_bytes,
        settings.max_files,
        crate::db::migrations::latest_version()
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

/// Chains onto the existing hook; only called by the one successful `start`.
fn install_panic_logger() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |location| format!("{}:{}", location.file(), location.line()),
        );
        error!(
            "event=panic module=core status=error location={location} message={}",
            panic_summary(info.payload())
        );
        previous(info);
    }));
}

/// One-line, length-capped panic message; payloads may echo record fields.
fn panic_summary(payload: &(dyn Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    let summary = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if summary.chars().count() <= PANIC_SUMMARY_MAX_CHARS {
        return summary;
    }
    let mut capped: String = summary.chars().take(PANIC_SUMMARY_MAX_CHARS).collect();
    capped.push_str("...");
    capped
}
