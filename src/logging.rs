use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Result, ScrapingError};

/// `<dir>/<prefix>_<YYYYmmdd>.log`
pub fn log_file_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}_{}.log", prefix, date.format("%Y%m%d")))
}

/// Send events to stderr and append them to today's log file.
///
/// `RUST_LOG` wins over the configured level.
pub fn init(config: &LoggingConfig) -> Result<PathBuf> {
    fs::create_dir_all(&config.directory)
        .map_err(|e| ScrapingError::Config(format!("Failed to create log directory: {}", e)))?;

    let path = log_file_path(&config.directory, &config.file_prefix, Local::now().date_naive());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ScrapingError::Config(format!("Failed to open log file {}: {}", path.display(), e)))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ScrapingError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| ScrapingError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_is_named_by_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            log_file_path(Path::new("logs"), "scraper", date),
            PathBuf::from("logs/scraper_20240115.log")
        );
    }
}
