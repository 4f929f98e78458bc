use std::sync::Mutex;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::AppPaths;

static LOG_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Installs stdout and daily-rolling file logging.
///
/// `file_name` is the log file prefix inside the log directory, so each
/// binary keeps its own file (`server.log`, `extract.log`, ...).
pub fn init(paths: &AppPaths, file_name: &str) {
    let log_dir = &paths.log_dir;
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if let Ok(mut slot) = LOG_GUARD.lock() {
        slot.get_or_insert(guard);
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    // A second init (tests, embedding binaries) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}

/// Drains buffered file output. Statics are never dropped, so call this
/// before exiting on an error path.
pub fn flush() {
    if let Ok(mut slot) = LOG_GUARD.lock() {
        slot.take();
    }
}
