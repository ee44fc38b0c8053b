//! Configuration module
//!
//! This module handles application configuration: the `ProxyConfig` value
//! object, loading it from a JSON file layered with environment variables,
//! and validating it before the proxy starts.

// Submodules
pub mod defaults;
pub mod error;
mod loader;
mod validator;

// Re-export types and traits
pub use self::error::ConfigError;
pub use self::loader::ConfigLoader;
pub use self::validator::ConfigValidator;
pub use defaults::{ENV_PREFIX, DEFAULT_CONFIG_FILE, LISTEN_STR, LOG_LEVEL_STR};

use log::info;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{parse_socket_addr, ProxyError, Result};

/// Proxy configuration
///
/// Read once at startup and immutable afterwards. Shared with every
/// connection task behind an `Arc`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen address, e.g. `:3128` or `127.0.0.1:3128`
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: String,

    /// Parent proxy URL (`scheme://host[:port]`), required
    pub parent_proxy: String,

    /// Basic auth username for the parent proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password for the parent proxy
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Log file; stdout when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Blocked host patterns, matched exactly or as a domain suffix
    pub blocked_hosts: Vec<String>,

    /// Upstream timeout in seconds, zero means the default
    #[serde(default = "defaults::timeout_sec")]
    pub timeout_sec: u64,

    /// Annotate log lines with the client's process
    pub debug: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: defaults::listen_addr(),
            parent_proxy: String::new(),
            username: None,
            password: None,
            log_file: None,
            blocked_hosts: Vec::new(),
            timeout_sec: defaults::timeout_sec(),
            debug: false,
            log_level: defaults::log_level(),
        }
    }
}

// The password never reaches logs or debug output
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("listen_addr", &self.listen_addr)
            .field("parent_proxy", &self.parent_proxy)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("log_file", &self.log_file)
            .field("blocked_hosts", &self.blocked_hosts)
            .field("timeout_sec", &self.timeout_sec)
            .field("debug", &self.debug)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ProxyConfig {
    /// Upstream timeout, substituting the default for zero
    pub fn timeout(&self) -> Duration {
        if self.timeout_sec == 0 {
            Duration::from_secs(defaults::TIMEOUT_SEC)
        } else {
            Duration::from_secs(self.timeout_sec)
        }
    }

    /// Resolve the listen address
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.listen_addr)
    }

    /// Parse the parent proxy URL
    ///
    /// The URL must use `http` or `https` and carry a host.
    pub fn parent_url(&self) -> Result<Url> {
        if self.parent_proxy.trim().is_empty() {
            return Err(ConfigError::Missing("parent_proxy").into());
        }

        let url = Url::parse(self.parent_proxy.trim()).map_err(|e| {
            ProxyError::from(ConfigError::bad("parent_proxy", e.to_string()))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::bad(
                    "parent_proxy",
                    format!("unsupported scheme '{}', expected http or https", other),
                )
                .into());
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::bad("parent_proxy", "missing host").into());
        }

        Ok(url)
    }

    /// Username and password pair, present when either one is set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().unwrap_or("");
        let password = self.password.as_deref().unwrap_or("");
        if username.is_empty() && password.is_empty() {
            None
        } else {
            Some((username, password))
        }
    }

    /// Return a copy with defaults substituted and patterns normalized
    ///
    /// Blocked host patterns are trimmed and lowercased, empty ones dropped.
    /// An empty log file path means stdout.
    pub fn normalized(mut self) -> Self {
        if self.timeout_sec == 0 {
            self.timeout_sec = defaults::TIMEOUT_SEC;
        }

        self.blocked_hosts = self.blocked_hosts
            .iter()
            .map(|pattern| pattern.trim().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();

        if self.log_file.as_ref().is_some_and(|path| path.as_os_str().is_empty()) {
            self.log_file = None;
        }

        self
    }
}

/// Log the effective configuration
pub fn log_config(config: &ProxyConfig) {
    // Only log in info level or below
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("Listen address: {}", config.listen_addr);
    info!("Parent proxy: {}", config.parent_proxy);
    if let Some((username, _)) = config.credentials() {
        info!("Parent proxy authentication: basic (user '{}')", username);
    }
    info!("Blocked host patterns: {}", config.blocked_hosts.len());
    info!("Upstream timeout: {} seconds", config.timeout().as_secs());
    if config.debug {
        info!("Debug mode: client process identification enabled");
    }
}
