//! Common module
//!
//! This module contains shared errors, logging setup, and network helpers used throughout the application.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{ProxyError, Result};
pub use self::log::init_logger;
pub use net::{bare_authority, bind_listener, parse_socket_addr, strip_port};
