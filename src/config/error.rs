//! Configuration errors
//!
//! Everything that can go wrong before the proxy starts serving: a missing
//! or unreadable file, or a setting the proxy cannot work with.

use std::path::PathBuf;
use thiserror::Error;

use crate::common::ProxyError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// JSON syntax errors, type mismatches and bad environment overrides
    #[error("cannot read configuration: {0}")]
    Unreadable(String),

    #[error("{setting}: {reason}")]
    BadSetting { setting: &'static str, reason: String },

    #[error("{0} is required")]
    Missing(&'static str),
}

impl ConfigError {
    pub(crate) fn bad(setting: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::BadSetting { setting, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::Unreadable(err.to_string())
    }
}

impl From<ConfigError> for ProxyError {
    fn from(err: ConfigError) -> Self {
        ProxyError::Config(err.to_string())
    }
}
