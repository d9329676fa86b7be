use crate::error::CatGraphError;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log file written by [`setup_logging`]
pub const LOG_FILE_NAME: &str = "catgraph.log";

const CATGRAPH_TARGETS: [&str; 5] = [
    "catgraph",
    "catgraph_common",
    "catgraph_embed",
    "catgraph_vector",
    "catgraph_ingest",
];

/// `RUST_LOG` if set, otherwise `level` for catgraph crates and `warn` for
/// dependencies (reqwest, hyper, candle)
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = parse_log_level(log_level).to_string().to_lowercase();
        let directives: Vec<String> = std::iter::once("warn".to_string())
            .chain(CATGRAPH_TARGETS.iter().map(|t| format!("{}={}", t, level)))
            .collect();
        EnvFilter::new(directives.join(","))
    })
}

fn install_error(e: impl std::fmt::Display) -> CatGraphError {
    CatGraphError::config(format!("Failed to install log subscriber: {}", e))
}

/// Initialize logging: stderr console layer plus an append-only
/// [`LOG_FILE_NAME`] in `log_dir`.
///
/// stdout is left to command output (reports, graph exports).
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<(), CatGraphError> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        CatGraphError::config(format!(
            "Failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| {
            CatGraphError::config(format!("Failed to open log file {}: {}", log_path.display(), e))
        })?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(log_filter(log_level));

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(log_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(install_error)?;

    tracing::debug!("Logging to {} at level {}", log_path.display(), log_level);
    Ok(())
}

/// Console-only logging, for commands that should not touch the log directory
pub fn setup_console_logging(log_level: &str) -> Result<(), CatGraphError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(log_filter(log_level))
        .try_init()
        .map_err(install_error)
}

/// Parse a level name (case-insensitive); unknown names fall back to INFO
pub fn parse_log_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO", level);
            Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_log_level(" info "), Level::INFO);
        assert_eq!(parse_log_level("Warning"), Level::WARN);
        assert_eq!(parse_log_level("error"), Level::ERROR);
        assert_eq!(parse_log_level("loud"), Level::INFO);
    }

    #[test]
    fn test_setup_logging_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        // another test may already own the global subscriber
        let _ = setup_logging(&log_dir, "debug");
        assert!(log_dir.join(LOG_FILE_NAME).exists());
    }
}
