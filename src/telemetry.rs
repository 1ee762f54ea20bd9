use crate::errors::{AppError, AppResult};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the JSON file subscriber. Later calls are no-ops.
pub fn init_tracing(log_dir: &Path, default_filter: &str) -> AppResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(log_dir).map_err(|error| AppError::Io(error.to_string()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "todo.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return Ok(());
    }

    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init();

    if let Err(error) = installed {
        // another subscriber (e.g. a test harness) already owns the global slot
        tracing::debug!(error = %error, "tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn repeated_init_is_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        init_tracing(&log_dir, "debug").expect("first init");
        init_tracing(&log_dir, "debug").expect("second init");
    }
}
