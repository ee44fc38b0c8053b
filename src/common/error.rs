//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Mini proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TCP connection to the parent proxy failed or timed out
    #[error("dial parent {addr}: {reason}")]
    UpstreamDial { addr: String, reason: String },

    /// Forwarded request through the parent proxy failed
    #[error("upstream request: {0}")]
    UpstreamRequest(#[from] reqwest::Error),

    /// Parent proxy answered CONNECT with something other than 200
    #[error("parent CONNECT failed: {0}")]
    ParentRefused(String),

    /// The client connection cannot be detached from HTTP framing
    #[error("hijack not supported")]
    HijackUnsupported,

    /// Malformed request or response
    #[error("HTTP error: {0}")]
    Http(String),

    /// Talking to the Windows Service Control Manager failed
    #[error("service control: {0}")]
    Service(String),
}

impl ProxyError {
    /// Short tag used for metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Bind { .. } => "bind",
            Self::UpstreamDial { .. } => "upstream_dial",
            Self::UpstreamRequest(_) => "upstream_request",
            Self::ParentRefused(_) => "parent_refused",
            Self::HijackUnsupported => "hijack_unsupported",
            Self::Http(_) => "http",
            Self::Service(_) => "service",
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
