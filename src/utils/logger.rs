use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::error::{AppError, AppResult};

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "smart-planner.log";
const DEFAULT_LOG_DIRECTIVES: &str =
    "info,app::scheduler=debug,app::ai=debug,app::planner=info,app::db=info";

/// `RUST_LOG` when set and valid, otherwise the planner defaults.
pub fn log_filter() -> AppResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))
        .map_err(|err| AppError::other(format!("invalid log directives: {err}")))
}

/// Installs the global subscriber: a daily-rolling file under `log_dir` plus stdout.
/// Only the first call has any effect.
pub fn init_logging(log_dir: &Path) -> AppResult<()> {
    FILE_GUARD
        .get_or_try_init(|| {
            std::fs::create_dir_all(log_dir)?;
            let filter = log_filter()?;

            let (file_writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339());
            let stdout_layer = fmt::layer()
                .with_target(false)
                .with_timer(UtcTime::rfc_3339());

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .try_init()
                .map_err(|err| AppError::other(format!("failed to install subscriber: {err}")))?;

            Ok::<_, AppError>(guard)
        })
        .map(|_| ())
}
