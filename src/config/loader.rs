//! Configuration loading functionality
//!
//! Configuration is layered with the `config` crate: serde defaults, then the
//! JSON file, then `MINI_PROXY_*` environment variables.

use ::config::{Config, Environment, File, FileFormat};
use log::debug;
use std::path::Path;

use crate::config::defaults::ENV_PREFIX;
use crate::config::error::{ConfigError, Result};
use crate::config::ProxyConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file only
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> where Self: Sized;

    /// Load configuration from a JSON file with environment overrides
    ///
    /// Environment variables use the `MINI_PROXY_` prefix followed by the
    /// upper-cased field name. `MINI_PROXY_BLOCKED_HOSTS` takes a
    /// comma-separated list.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> where Self: Sized;
}

impl ConfigLoader for ProxyConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from file: {}", path.display());

        let settings = Config::builder()
            .add_source(file_source(path)?)
            .build()?;

        Ok(settings.try_deserialize::<ProxyConfig>()?.normalized())
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(
            "Loading configuration from {} with {}_* environment overrides",
            path.display(),
            ENV_PREFIX
        );

        let settings = Config::builder()
            .add_source(file_source(path)?)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("blocked_hosts"),
            )
            .build()?;

        Ok(settings.try_deserialize::<ProxyConfig>()?.normalized())
    }
}

fn file_source(path: &Path) -> Result<File<::config::FileSourceFile, FileFormat>> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    Ok(File::from(path).format(FileFormat::Json).required(true))
}
