use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

/// Dependencies that are only interesting when something breaks
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let directives = QUIET_TARGETS
        .iter()
        .map(|target| format!("{}=warn", target))
        .fold(level.to_string(), |acc, d| format!("{},{}", acc, d));
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber: console output, plus a timestamped file in
/// `log_dir` when one is given. `RUST_LOG` overrides the default filter.
///
/// Returns the log file path.
pub fn setup_logging(log_dir: Option<&Path>, verbose: bool) -> io::Result<Option<PathBuf>> {
    let log_path = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            Some(dir.join(format!("image_dataset_{}.log", timestamp)))
        }
        None => None,
    };

    let file_layer = match &log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .event_format(BracketedFormatter { with_location: true })
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter {
            with_location: verbose,
        })
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose)))
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    if let Some(path) = &log_path {
        info!("Log file created at: {:?}", path);
    }
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_dependencies() {
        let filter = default_filter(false).to_string();
        assert!(filter.contains("info"));
        assert!(filter.contains("reqwest=warn"));
        assert!(default_filter(true).to_string().contains("debug"));
    }
}
