//! Logging setup
//!
//! Installs `env_logger` as the `log` backend. Every record becomes one line
//! prefixed with a local timestamp and the application tag, written either to
//! stdout or appended to the configured log file.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::{ProxyError, Result};

/// Tag written in front of every log message
pub const LOG_PREFIX: &str = "mini-proxy";

/// Initialize the logging system
///
/// # Parameters
///
/// * `level` - Default log level, overridden by `RUST_LOG` when set
/// * `log_file` - Optional file to append to instead of stdout
///
/// # Returns
///
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(level: &str, log_file: Option<&Path>) -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    let mut builder = env_logger::Builder::from_env(env);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            Local::now().format("%Y/%m/%d %H:%M:%S"),
            record.level(),
            LOG_PREFIX,
            record.args()
        )
    });

    if let Some(path) = log_file {
        let path = resolve_log_path(path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ProxyError::Config(format!(
                "open log file ({}): {}", path.display(), e
            )))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()
        .map_err(|e| ProxyError::Config(format!("Failed to initialize logger: {}", e)))
}

/// Resolve a log file path
///
/// Relative paths are taken relative to the directory holding the executable,
/// so a service started from an arbitrary working directory still logs next
/// to its binary.
pub fn resolve_log_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_exe() {
        Ok(exe) => match exe.parent() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
