//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is designed to be a single source of truth for defaults,
//! making it easier to maintain consistent defaults across the application.

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "MINI_PROXY";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default listen address as string (all interfaces)
pub const LISTEN_STR: &str = ":3128";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Timeout applied when the configured value is zero or absent
pub const TIMEOUT_SEC: u64 = 30;

/// Default listen address
pub fn listen_addr() -> String {
    LISTEN_STR.to_string()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default upstream timeout in seconds
pub fn timeout_sec() -> u64 {
    TIMEOUT_SEC
}
