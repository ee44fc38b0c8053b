//! Mini Proxy: a forwarding HTTP/HTTPS proxy chained through a parent proxy
//!
//! Clients configure this proxy as their HTTP proxy. Every request is sent on
//! through a single upstream ("parent") proxy, optionally authenticating to it
//! with HTTP Basic credentials. Requests for blocked hosts are refused locally
//! and never reach the parent.
//!
//! # Main Features
//!
//! - Plain HTTP forwarding with streamed request and response bodies
//! - HTTPS via CONNECT, chained to the parent and spliced byte for byte
//! - Host blocklist matching exact hosts and their sub-domains
//! - Optional client process identification in debug mode
//! - Graceful shutdown with a bounded grace period
//!
//! # Example
//!
//! ```no_run
//! use mini_proxy::{run, Result};
//! use mini_proxy::config::ProxyConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ProxyConfig {
//!         listen_addr: "127.0.0.1:3128".to_string(),
//!         parent_proxy: "http://corporate-proxy:8080".to_string(),
//!         blocked_hosts: vec!["ads.example.com".to_string()],
//!         ..ProxyConfig::default()
//!     };
//!
//!     run(config, mini_proxy::service::shutdown_signal()).await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod identify;
pub mod proxy;
pub mod service;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, ProxyError, Result};
pub use crate::config::ProxyConfig;
pub use proxy::Proxy;

use log::info;
use std::future::Future;

use crate::config::ConfigValidator;

/// Size of the relay buffers used by CONNECT tunnels
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Validate `config`, bind the listener and serve until `stop` completes
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listen address
/// cannot be bound. Per-request failures are answered and logged, never
/// returned.
pub async fn run<F>(config: ProxyConfig, stop: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let proxy = Proxy::bind(&config).await?;
    info!(
        "Starting mini proxy on {}, forwarding to {}",
        proxy.local_addr(),
        config.parent_proxy
    );

    proxy.run(stop).await
}
