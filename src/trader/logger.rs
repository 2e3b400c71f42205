//! Logging setup for the backtesting platform.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::utility::get_folder_path;

/// Logging configuration, injected rather than read from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: "debug", "info", "warn" or "error"
    pub level: String,
    pub console: bool,
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: false,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "debug" | "trace" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the tracing subscriber.
///
/// Console output honors `RUST_LOG` on top of the configured level; file
/// output goes to a date-stamped file under the application log folder.
/// Calling this twice is a no-op error from the registry, which is ignored
/// so tests can initialize freely.
pub fn init_logger(config: &LogConfig) {
    let level = parse_level(&config.level);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let registry = tracing_subscriber::registry().with(filter);

    if config.console && config.file {
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(open_log_file()))
            .with_ansi(false);
        let _ = registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .with(file_layer)
            .try_init();
    } else if config.console {
        let _ = registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init();
    } else if config.file {
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(open_log_file()))
            .with_ansi(false);
        let _ = registry.with(file_layer).try_init();
    }
}

fn open_log_file() -> std::fs::File {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .expect("failed to open log file")
}

/// Log file path for today
fn log_file_path() -> PathBuf {
    let folder = get_folder_path("log");
    let today = Local::now().format("%Y%m%d").to_string();
    folder.join(format!("fxbt_{}.log", today))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("INFO"), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("unknown"), Level::INFO);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig {
            level: "info".to_string(),
            console: true,
            file: false,
        };
        init_logger(&config);
        init_logger(&config);
    }
}
