use std::fs;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::env_truthy;
use crate::errors::{LauncherError, Result};

const LOG_FILE_PREFIX: &str = "launcher.log";
const DEFAULT_FILTER: &str = "info";

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// Mirror records to stderr as well as the log file.
    pub echo_stderr: bool,
}

impl LogSettings {
    /// `LAUNCHER_LOG_STDERR=1` turns the stderr echo on even without `--verbose`.
    pub fn new(dir: PathBuf, verbose: bool) -> Self {
        Self {
            dir,
            echo_stderr: verbose || env_truthy("LAUNCHER_LOG_STDERR"),
        }
    }
}

/// Installs the global subscriber: a daily rolling file under `settings.dir`, plus stderr when
/// asked. `RUST_LOG` overrides the `info` default. A second call fails with a config error.
pub fn init(settings: &LogSettings) -> Result<()> {
    fs::create_dir_all(&settings.dir)?;

    let file_appender = tracing_appender::rolling::daily(&settings.dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true);
    let stderr_layer = settings.echo_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| LauncherError::Config(err.to_string()))?;
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
